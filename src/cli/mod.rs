//! CLI module
//!
//! Command-line interface for running the batch jobs.
//!
//! # Commands
//!
//! - `touchpoints` - Export contact source history to CSV
//! - `backfill-datetimes` - Fill `<field>_datetime` companion properties
//! - `engagements` - Engagements before a deal was created
//! - `reshape-history` - Reshape a local stage history CSV
//! - `service-period` - Months of an invoicing period
//! - `fetch` - Dump any paginated listing as JSON lines

mod commands;
mod runner;

pub use commands::{Cli, Commands, ItemErrors, OutputFormat, PaginationStyle};
pub use runner::Runner;
