//! Export every marketing touchpoint of every contact to CSV
//!
//! A touchpoint is one entry in the history of `hs_latest_source` whose value
//! is a known source. The matching `hs_latest_source_data_1/2` entries are
//! taken from the same history position.

use crate::config::TouchpointSettings;
use crate::decode::csv::CsvWriter;
use crate::error::Result;
use crate::http::HttpClient;
use crate::pagination::{FetchRequest, PaginatedFetcher};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

/// Contacts listing endpoint
pub const CONTACTS_PATH: &str = "/crm/v3/objects/contacts";

/// Source values that count as touchpoints
pub const VALID_SOURCES: &[&str] = &[
    "REFERRALS",
    "OTHER_CAMPAIGNS",
    "ORGANIC_SOCIAL",
    "SOCIAL_ORGANIC",
    "PAID_SEARCH",
    "PAID_SOCIAL",
    "EVENTS",
    "NETWORK",
    "OFFLINE",
    "EMAIL_MARKETING",
    "DIRECT_TRAFFIC",
    "ORGANIC_SEARCH",
    "OTHER",
];

/// Output columns
pub const CSV_HEADER: [&str; 9] = [
    "contact_id",
    "associatedcompanyid",
    "timestamp_touchpoint",
    "source_touchpoint",
    "source_data_1_touchpoint",
    "source_data_2_touchpoint",
    "hs_analytics_source",
    "hs_analytics_source_data_1",
    "hs_analytics_source_data_2",
];

const HISTORY_PROPERTIES: &str = "hs_latest_source,hs_latest_source_data_1,hs_latest_source_data_2";
const PROPERTIES: &str =
    "associatedcompanyid,hs_analytics_source,hs_analytics_source_data_1,hs_analytics_source_data_2";
const UNKNOWN: &str = "unknown";

/// One CSV row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Touchpoint {
    pub contact_id: String,
    pub associated_company_id: String,
    /// Empty when the history entry has no timestamp
    pub timestamp: String,
    pub source: String,
    pub source_data_1: String,
    pub source_data_2: String,
    pub analytics_source: String,
    pub analytics_source_data_1: String,
    pub analytics_source_data_2: String,
}

impl Touchpoint {
    /// Fields in [`CSV_HEADER`] order
    pub fn to_row(&self) -> [&str; 9] {
        [
            &self.contact_id,
            &self.associated_company_id,
            &self.timestamp,
            &self.source,
            &self.source_data_1,
            &self.source_data_2,
            &self.analytics_source,
            &self.analytics_source_data_1,
            &self.analytics_source_data_2,
        ]
    }
}

/// Summary of an export run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TouchpointReport {
    pub pages: usize,
    pub contacts: usize,
    pub touchpoints: usize,
}

fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn history<'a>(contact: &'a Value, property: &str) -> &'a [Value] {
    contact
        .get("propertiesWithHistory")
        .and_then(|h| h.get(property))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn history_value(entries: &[Value], idx: usize) -> String {
    scalar(entries.get(idx).and_then(|e| e.get("value"))).unwrap_or_else(|| UNKNOWN.to_string())
}

/// Build the touchpoints of one contact record
pub fn build_touchpoints(contact: &Value) -> Vec<Touchpoint> {
    let contact_id = scalar(contact.get("id")).unwrap_or_default();
    let property = |name: &str| {
        scalar(contact.get("properties").and_then(|p| p.get(name)))
            .unwrap_or_else(|| UNKNOWN.to_string())
    };
    let associated_company_id = property("associatedcompanyid");
    let analytics_source = property("hs_analytics_source");
    let analytics_source_data_1 = property("hs_analytics_source_data_1");
    let analytics_source_data_2 = property("hs_analytics_source_data_2");

    let sources = history(contact, "hs_latest_source");
    let data_1 = history(contact, "hs_latest_source_data_1");
    let data_2 = history(contact, "hs_latest_source_data_2");

    sources
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            let source = history_value(sources, idx);
            if !VALID_SOURCES.contains(&source.as_str()) {
                return None;
            }
            Some(Touchpoint {
                contact_id: contact_id.clone(),
                associated_company_id: associated_company_id.clone(),
                timestamp: scalar(entry.get("timestamp")).unwrap_or_default(),
                source,
                source_data_1: history_value(data_1, idx),
                source_data_2: history_value(data_2, idx),
                analytics_source: analytics_source.clone(),
                analytics_source_data_1: analytics_source_data_1.clone(),
                analytics_source_data_2: analytics_source_data_2.clone(),
            })
        })
        .collect()
}

/// Append touchpoints to `path`, writing the header only into an empty file
pub fn append_touchpoints(path: &Path, touchpoints: &[Touchpoint]) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_empty = file.metadata()?.len() == 0;

    let mut writer = CsvWriter::new(BufWriter::new(file));
    if is_empty {
        writer.write_row(&CSV_HEADER)?;
    }
    for touchpoint in touchpoints {
        writer.write_row(&touchpoint.to_row())?;
    }
    writer.into_inner()?;
    Ok(())
}

/// Page through all contacts and append their touchpoints to the CSV
pub async fn export_touchpoints(
    client: &HttpClient,
    settings: &TouchpointSettings,
) -> Result<TouchpointReport> {
    let request = FetchRequest::get(CONTACTS_PATH)
        .param("limit", settings.page_size)
        .param("propertiesWithHistory", HISTORY_PROPERTIES)
        .param("properties", PROPERTIES)
        .with_limit(settings.contact_limit);

    let fetcher = PaginatedFetcher::new(client.clone());
    let mut pages = Box::pin(fetcher.fetch_all(request));
    let mut report = TouchpointReport::default();

    while let Some(page) = pages.try_next().await? {
        let touchpoints: Vec<Touchpoint> = page.records.iter().flat_map(build_touchpoints).collect();
        append_touchpoints(&settings.output, &touchpoints)?;

        debug!("Page {}: {} touchpoints", page.index + 1, touchpoints.len());
        report.pages += 1;
        report.contacts += page.len();
        report.touchpoints += touchpoints.len();
    }

    info!(
        "Exported {} touchpoints from {} contacts to {}",
        report.touchpoints,
        report.contacts,
        settings.output.display()
    );
    Ok(report)
}
