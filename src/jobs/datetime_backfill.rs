//! Backfill `<field>_datetime` properties from custom date properties
//!
//! For every configured date field the job makes sure a datetime companion
//! property exists, then pages through the objects and writes the moment the
//! date was last set into the companion, one `batch/update` per page.

use crate::config::BackfillSettings;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::pagination::{FetchRequest, PaginatedFetcher};
use crate::types::{ItemErrorPolicy, Method, ObjectType};
use chrono::{DateTime, NaiveDate, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Time of day used when the history has no matching timestamp
pub const FALLBACK_TIME: &str = "T06:00:00.000Z";

/// Name of the companion property
pub fn datetime_property_name(field: &str) -> String {
    format!("{field}_datetime")
}

/// Summary of a backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Companion properties created
    pub properties_created: usize,
    /// Objects read
    pub objects_seen: usize,
    /// Objects included in a successful `batch/update`
    pub objects_updated: usize,
    /// `batch/update` calls that failed and were skipped
    pub failed_batches: usize,
}

/// Pick the datetime for a date property from its history (newest first).
///
/// If the entry that last set the date was written on that same calendar day,
/// its timestamp is used; otherwise the date at 06:00 UTC. Returns `None` when
/// the history is empty or the value isn't a `YYYY-MM-DD` date.
pub fn pick_timestamp(history: &[Value]) -> Option<DateTime<Utc>> {
    let latest = history.first()?;
    let value = latest.get("value").and_then(Value::as_str)?;
    let date = match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => date,
        Err(e) => {
            warn!("Unparsable date value '{value}': {e}");
            return None;
        }
    };

    let changed_at = history
        .iter()
        .find_map(|entry| entry.get("timestamp").and_then(Value::as_str))
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    match changed_at {
        Some(ts) if ts.date_naive() == date => Some(ts),
        _ => DateTime::parse_from_rfc3339(&format!("{value}{FALLBACK_TIME}"))
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
    }
}

/// Build `batch/update` inputs for one page of objects
pub fn build_updates(objects: &[Value], fields: &[String]) -> Vec<Value> {
    objects
        .iter()
        .filter_map(|object| {
            let id = match object.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => return None,
            };

            let mut properties = Map::new();
            for field in fields {
                let history = object
                    .get("propertiesWithHistory")
                    .and_then(|h| h.get(field))
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                match pick_timestamp(history) {
                    Some(ts) => {
                        properties.insert(
                            datetime_property_name(field),
                            json!(ts.timestamp_millis()),
                        );
                    }
                    None => debug!("No datetime for {field} on object {id}"),
                }
            }

            (!properties.is_empty()).then(|| json!({"id": id, "properties": properties}))
        })
        .collect()
}

/// Create the companion property unless it exists. Returns true if created.
pub async fn ensure_datetime_property(
    client: &HttpClient,
    object_type: ObjectType,
    field: &str,
) -> Result<bool> {
    let name = datetime_property_name(field);
    let path = format!("/crm/v3/properties/{object_type}/{name}");

    match client.get_json(&path, RequestConfig::new()).await {
        Ok(_) => {
            info!("Property {name} already exists for {object_type}, skipping creation");
            return Ok(false);
        }
        Err(Error::ClientError { status: 404, .. }) => {}
        Err(e) => return Err(e),
    }

    let payload = json!({
        "label": format!("{field} - datetime"),
        "name": name,
        "groupName": object_type.property_group(),
        "type": "datetime",
        "fieldType": "date",
        "formField": true,
    });
    client
        .send_json(
            Method::POST,
            &format!("/crm/v3/properties/{object_type}"),
            payload,
        )
        .await?;

    info!("Created datetime property {name} for {object_type}");
    Ok(true)
}

/// Run the backfill for every configured object type
pub async fn backfill_datetimes(
    client: &HttpClient,
    settings: &BackfillSettings,
    policy: ItemErrorPolicy,
) -> Result<BackfillReport> {
    let mut report = BackfillReport::default();

    for (object_type, fields) in &settings.date_fields {
        if fields.is_empty() {
            info!("No date fields configured for {object_type}, skipping");
            continue;
        }
        for field in fields {
            if ensure_datetime_property(client, *object_type, field).await? {
                report.properties_created += 1;
            }
        }
    }

    let fetcher = PaginatedFetcher::new(client.clone());

    for (object_type, fields) in &settings.date_fields {
        if fields.is_empty() {
            continue;
        }

        let request = FetchRequest::get(format!("/crm/v3/objects/{object_type}"))
            .param("limit", settings.page_size)
            .param("propertiesWithHistory", fields.join(","));
        let update_path = format!("/crm/v3/objects/{object_type}/batch/update");

        let mut pages = Box::pin(fetcher.fetch_all(request));
        while let Some(page) = pages.try_next().await? {
            report.objects_seen += page.len();

            let inputs = build_updates(&page.records, fields);
            if inputs.is_empty() {
                info!("No valid updates for {object_type} on page {}", page.index + 1);
                continue;
            }

            let count = inputs.len();
            match client
                .send_json(Method::POST, &update_path, json!({ "inputs": inputs }))
                .await
            {
                Ok(_) => {
                    info!("Updated {count} {object_type} records");
                    report.objects_updated += count;
                }
                Err(e) if policy == ItemErrorPolicy::Skip => {
                    warn!("Batch update for {object_type} failed, skipping: {e}");
                    report.failed_batches += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(
        "Backfill done: {} created, {} seen, {} updated",
        report.properties_created, report.objects_seen, report.objects_updated
    );
    Ok(report)
}
