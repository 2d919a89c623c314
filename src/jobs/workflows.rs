//! Export automation workflows that use given CRM properties
//!
//! Lists every flow through the v4 automation API, reads each flow's full
//! definition over the worker pool, and saves enabled flows as JSON. Enabled
//! flows whose definition references one of the configured properties are
//! also saved to a second directory.

use crate::config::WorkflowSettings;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::pagination::{FetchRequest, NextUrlPaginator, PaginatedFetcher};
use crate::pool::WorkerPool;
use crate::types::ItemErrorPolicy;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const JOB: &str = "workflows";

/// Flow listing endpoint
pub const FLOWS_PATH: &str = "/automation/v4/flows";

/// Summary of an export run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowReport {
    pub listed: usize,
    /// Flows whose details could be read
    pub fetched: usize,
    pub enabled: usize,
    pub matched: usize,
    /// Saved files of matched flows
    pub matched_files: Vec<PathBuf>,
}

/// Whether any `"property": "<name>"` pair anywhere in `value` names one of
/// `properties`
pub fn references_property(value: &Value, properties: &[String]) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, nested)| {
            let named = key == "property"
                && nested
                    .as_str()
                    .is_some_and(|name| properties.iter().any(|p| p == name));
            named || references_property(nested, properties)
        }),
        Value::Array(items) => items.iter().any(|item| references_property(item, properties)),
        _ => false,
    }
}

/// File name for a saved flow: `<sanitized name>_<id>.json`
pub fn workflow_file_name(flow: &Value) -> String {
    let id = match flow.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown_id".to_string(),
    };
    let name = flow
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unnamed_Workflow");

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{id}.json", sanitized.trim().replace(' ', "_"))
}

fn save_flow(dir: &Path, flow: &Value) -> Result<PathBuf> {
    let path = dir.join(workflow_file_name(flow));
    fs::write(&path, serde_json::to_string_pretty(flow)?)?;
    debug!("Saved {}", path.display());
    Ok(path)
}

fn flow_id(flow: &Value) -> Option<String> {
    match flow.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Every flow in the portal, in listing order
pub async fn list_flows(client: &HttpClient, page_size: u32) -> Result<Vec<Value>> {
    PaginatedFetcher::new(client.clone())
        .with_paginator(NextUrlPaginator::default())
        .collect_records(FetchRequest::get(FLOWS_PATH).param("limit", page_size))
        .await
}

/// Full definition of one flow
pub async fn flow_details(client: &HttpClient, flow_id: &str) -> Result<Value> {
    client
        .get_json(&format!("{FLOWS_PATH}/{flow_id}"), RequestConfig::new())
        .await
}

/// Run the export
pub async fn export_workflows(
    client: &HttpClient,
    settings: &WorkflowSettings,
    policy: ItemErrorPolicy,
) -> Result<WorkflowReport> {
    if settings.properties.is_empty() {
        return Err(Error::job(JOB, "No properties to search for."));
    }
    fs::create_dir_all(&settings.enabled_dir)?;
    fs::create_dir_all(&settings.matched_dir)?;

    let flows = list_flows(client, settings.page_size).await?;
    info!("Listed {} workflows", flows.len());
    let ids: Vec<String> = flows.iter().filter_map(flow_id).collect();

    let pool = WorkerPool::new(settings.concurrency);
    let worker_client = client.clone();
    let details = pool
        .map_with_policy(ids, policy, move |id: String| {
            let client = worker_client.clone();
            async move { flow_details(&client, &id).await }
        })
        .await?;

    let mut report = WorkflowReport {
        listed: flows.len(),
        fetched: details.len(),
        ..WorkflowReport::default()
    };

    for flow in &details {
        if !flow.get("isEnabled").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        save_flow(&settings.enabled_dir, flow)?;
        report.enabled += 1;

        if references_property(flow, &settings.properties) {
            report.matched_files.push(save_flow(&settings.matched_dir, flow)?);
            report.matched += 1;
        }
    }

    info!(
        "{} of {} enabled workflows use {}",
        report.matched,
        report.enabled,
        settings.properties.join(", ")
    );
    Ok(report)
}
