//! Batch jobs
//!
//! Each job takes its client and settings explicitly and returns a report.
//!
//! - [`touchpoints`]: contact source history to CSV
//! - [`datetime_backfill`]: `<field>_datetime` companions for custom dates
//! - [`engagements`]: engagements before a deal's creation
//! - [`history`]: local stage history reshaping
//! - [`service_period`]: months of an invoicing period
//! - [`fetch`]: raw JSON-lines dump of any listing
//! - [`images`]: recompress large File Manager images and replace them
//! - [`workflows`]: export workflows that reference given properties

pub mod datetime_backfill;
pub mod engagements;
pub mod fetch;
pub mod history;
pub mod images;
pub mod service_period;
pub mod touchpoints;
pub mod workflows;

pub use datetime_backfill::{backfill_datetimes, BackfillReport};
pub use engagements::{engagements_before_deal, Engagement, EngagementReport};
pub use fetch::dump_records;
pub use history::{reshape_file, ReshapeReport};
pub use images::{compress_and_replace, ImageReport, ImageSteps};
pub use service_period::{service_period, ServicePeriod};
pub use touchpoints::{export_touchpoints, TouchpointReport};
pub use workflows::{export_workflows, WorkflowReport};
