//! Engagements that happened before a deal was created
//!
//! deal -> first associated company -> company contacts -> per-contact
//! engagement associations (fanned out over the worker pool) -> batch read of
//! engagement details -> filter on `hs_timestamp` < deal create date.

use crate::config::EngagementSettings;
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::pagination::{FetchRequest, NextUrlPaginator, PaginatedFetcher};
use crate::pool::WorkerPool;
use crate::types::{ItemErrorPolicy, Method};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

const JOB: &str = "engagements";

/// Properties read for every engagement
pub const DETAIL_PROPERTIES: [&str; 4] = ["hs_timestamp", "hs_activity_type", "subject", "createdate"];

/// Page size when listing a company's contacts
pub const COMPANY_CONTACTS_PAGE_SIZE: u32 = 100;

/// Format of the human-readable deal create date
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Interpret a create date given in epoch seconds or milliseconds
pub fn parse_create_date(raw: i64) -> Result<DateTime<Utc>> {
    if raw <= 0 {
        return Err(Error::job(JOB, "Deal creation date is missing."));
    }
    let millis = if raw > 1_000_000_000_000 {
        raw
    } else {
        raw.saturating_mul(1000)
    };
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| Error::job(JOB, format!("Invalid deal creation date: {raw}")))
}

/// One engagement with the fields used downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Engagement {
    pub engagement_id: String,
    /// Singular type, e.g. `call`
    pub engagement_type: String,
    /// `hs_activity_type`, falling back to `subject`
    pub engagement_outcome: Option<String>,
    pub timestamp: Option<String>,
    pub created_date: Option<String>,
}

impl Engagement {
    fn from_record(engagement_type: &str, record: &Value) -> Option<Self> {
        let id = id_of(record, "id")?;
        let property = |name: &str| {
            record
                .get("properties")
                .and_then(|p| p.get(name))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        Some(Self {
            engagement_id: id,
            engagement_type: singular(engagement_type).to_string(),
            engagement_outcome: property("hs_activity_type").or_else(|| property("subject")),
            timestamp: property("hs_timestamp"),
            created_date: property("createdate"),
        })
    }

    /// Parsed `hs_timestamp`
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Result of one lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementReport {
    pub deal_id: String,
    pub company_id: String,
    pub contact_count: usize,
    pub deal_create_date_formatted: String,
    /// Engagements before the deal, per singular type
    pub counts: BTreeMap<String, usize>,
    pub total_before_deal: usize,
    pub engagements_filtered: Vec<Engagement>,
    pub engagements_all: Vec<Engagement>,
}

fn singular(engagement_type: &str) -> &str {
    engagement_type
        .strip_suffix('s')
        .unwrap_or(engagement_type)
}

fn id_of(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First company associated with the deal
pub async fn associated_company_id(client: &HttpClient, deal_id: &str) -> Result<String> {
    let body = client
        .get_json(
            &format!("/crm/v3/objects/deals/{deal_id}"),
            RequestConfig::new().query("associations", "companies"),
        )
        .await?;

    let first = body
        .pointer("/associations/companies/results/0")
        .ok_or_else(|| Error::job(JOB, format!("No associated company found for deal {deal_id}")))?;
    id_of(first, "id").ok_or_else(|| {
        Error::job(
            JOB,
            format!("Association object does not contain 'id' for deal {deal_id}"),
        )
    })
}

/// List the ids an object is associated with, following `paging.next.link`
pub async fn associated_ids(client: &HttpClient, path: &str, page_size: u32) -> Result<Vec<String>> {
    let fetcher = PaginatedFetcher::new(client.clone()).with_paginator(NextUrlPaginator::default());
    let records = fetcher
        .collect_records(FetchRequest::get(path).param("limit", page_size))
        .await?;

    Ok(records
        .iter()
        .filter_map(|assoc| {
            let id = id_of(assoc, "toObjectId").or_else(|| id_of(assoc, "id"));
            if id.is_none() {
                warn!("Missing 'toObjectId' and 'id' in association: {assoc}");
            }
            id
        })
        .collect())
}

/// Engagement ids of one contact, per engagement type
pub async fn contact_engagement_ids(
    client: &HttpClient,
    contact_id: &str,
    engagement_types: &[String],
    page_size: u32,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut ids = BTreeMap::new();
    for engagement_type in engagement_types {
        debug!("Fetching {engagement_type} for contact {contact_id}");
        let path = format!("/crm/v3/objects/contacts/{contact_id}/associations/{engagement_type}");
        ids.insert(
            engagement_type.clone(),
            associated_ids(client, &path, page_size).await?,
        );
    }
    Ok(ids)
}

/// Read engagement details in chunks of `batch_size`
pub async fn batch_read(
    client: &HttpClient,
    engagement_type: &str,
    ids: &[String],
    batch_size: u32,
) -> Result<Vec<Engagement>> {
    let path = format!("/crm/v3/objects/{engagement_type}/batch/read");
    let mut engagements = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(batch_size.max(1) as usize) {
        let payload = json!({
            "properties": DETAIL_PROPERTIES,
            "inputs": chunk.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
            "archived": false,
        });
        let body = client.send_json(Method::POST, &path, payload).await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::malformed(format!("{path} response has no results array")))?;

        engagements.extend(
            results
                .iter()
                .filter_map(|record| Engagement::from_record(engagement_type, record)),
        );
    }
    Ok(engagements)
}

/// Run the full lookup for one deal
pub async fn engagements_before_deal(
    client: &HttpClient,
    settings: &EngagementSettings,
    policy: ItemErrorPolicy,
    deal_id: &str,
    deal_create_date: i64,
) -> Result<EngagementReport> {
    if deal_id.trim().is_empty() {
        return Err(Error::job(JOB, "Deal ID is missing."));
    }
    let created_at = parse_create_date(deal_create_date)?;
    let formatted = created_at.format(DATE_FORMAT).to_string();
    info!("Deal {deal_id} created {formatted}");

    let company_id = associated_company_id(client, deal_id).await?;
    info!("Associated company: {company_id}");

    let contact_ids = associated_ids(
        client,
        &format!("/crm/v3/objects/companies/{company_id}/associations/contacts"),
        COMPANY_CONTACTS_PAGE_SIZE,
    )
    .await?;
    if contact_ids.is_empty() {
        return Err(Error::job(
            JOB,
            format!("No contacts associated with company {company_id}"),
        ));
    }
    info!("Found {} contacts", contact_ids.len());

    let pool = WorkerPool::new(settings.concurrency);
    let worker_client = client.clone();
    let types = settings.engagement_types.clone();
    let page_size = settings.association_page_size;
    let per_contact = pool
        .map_with_policy(contact_ids.clone(), policy, move |contact_id: String| {
            let client = worker_client.clone();
            let types = types.clone();
            async move { contact_engagement_ids(&client, &contact_id, &types, page_size).await }
        })
        .await?;

    let mut all = Vec::new();
    for engagement_type in &settings.engagement_types {
        let mut seen = HashSet::new();
        let ids: Vec<String> = per_contact
            .iter()
            .filter_map(|by_type| by_type.get(engagement_type))
            .flatten()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();
        if ids.is_empty() {
            continue;
        }

        info!("Fetching details for {} {engagement_type}", ids.len());
        all.extend(batch_read(client, engagement_type, &ids, settings.batch_size).await?);
    }

    let filtered: Vec<Engagement> = all
        .iter()
        .filter(|engagement| match engagement.occurred_at() {
            Some(ts) => ts < created_at,
            None => {
                warn!(
                    "Engagement {} has no usable hs_timestamp",
                    engagement.engagement_id
                );
                false
            }
        })
        .cloned()
        .collect();

    let mut counts: BTreeMap<String, usize> = settings
        .engagement_types
        .iter()
        .map(|t| (singular(t).to_string(), 0))
        .collect();
    for engagement in &filtered {
        *counts.entry(engagement.engagement_type.clone()).or_default() += 1;
    }

    info!(
        "{} of {} engagements happened before deal creation",
        filtered.len(),
        all.len()
    );

    Ok(EngagementReport {
        deal_id: deal_id.to_string(),
        company_id,
        contact_count: contact_ids.len(),
        deal_create_date_formatted: formatted,
        counts,
        total_before_deal: filtered.len(),
        engagements_filtered: filtered,
        engagements_all: all,
    })
}
