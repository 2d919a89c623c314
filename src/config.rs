//! Application configuration
//!
//! Every job receives an [`AppConfig`] explicitly. It is loaded from an
//! optional YAML file; the access token comes from the `--token` flag or the
//! `HUBSPOT_ACCESS_TOKEN` environment variable and is never written back out.
//!
//! ```yaml
//! hubspot:
//!   base_url: https://api.hubapi.com
//!   timeout_seconds: 30
//!   rate_limit:
//!     max_requests: 100
//!     interval_ms: 10000
//! retry:
//!   max_attempts: 5
//!   base_delay_ms: 2000
//! backfill:
//!   date_fields:
//!     contacts: [custom_date1, custom_date2]
//!     deals: [custom_date1]
//! images:
//!   min_size_bytes: 800000
//! workflows:
//!   properties: [lifecyclestage, dealstage]
//! item_errors: skip
//! ```

use crate::auth::AuthConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RateLimiterConfig, RetryPolicy, DEFAULT_BASE_URL};
use crate::types::{BackoffType, ItemErrorPolicy, ObjectType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the private app access token
pub const TOKEN_ENV_VAR: &str = "HUBSPOT_ACCESS_TOKEN";

/// Largest page/batch size the CRM v3 object endpoints accept
pub const MAX_PAGE_SIZE: u32 = 100;

/// Largest page size of the v4 association listings
pub const MAX_ASSOCIATION_PAGE_SIZE: u32 = 500;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// API connection settings
    #[serde(default)]
    pub hubspot: HubspotSettings,

    /// Retry policy for every request
    #[serde(default)]
    pub retry: RetrySettings,

    /// Touchpoint export job
    #[serde(default)]
    pub touchpoints: TouchpointSettings,

    /// Datetime backfill job
    #[serde(default)]
    pub backfill: BackfillSettings,

    /// Engagement lookup job
    #[serde(default)]
    pub engagements: EngagementSettings,

    /// File manager image recompression job
    #[serde(default)]
    pub images: ImageSettings,

    /// Workflow export job
    #[serde(default)]
    pub workflows: WorkflowSettings,

    /// What to do when a single record or sub-fetch fails
    #[serde(default)]
    pub item_errors: ItemErrorPolicy,
}

impl AppConfig {
    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = if yaml.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Override the access token (a `None` keeps the current one)
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.hubspot.access_token = Some(token);
        }
        self
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier", "must be >= 1.0"));
        }
        if self.hubspot.timeout_seconds == 0 {
            return Err(invalid("hubspot.timeout_seconds", "must be at least 1"));
        }
        if let Some(ref limit) = self.hubspot.rate_limit {
            if limit.max_requests == 0 || limit.interval_ms == 0 {
                return Err(invalid(
                    "hubspot.rate_limit",
                    "max_requests and interval_ms must be positive",
                ));
            }
        }
        check_page_size("touchpoints.page_size", self.touchpoints.page_size)?;
        check_page_size("backfill.page_size", self.backfill.page_size)?;
        check_page_size("engagements.batch_size", self.engagements.batch_size)?;
        check_range(
            "engagements.association_page_size",
            self.engagements.association_page_size,
            MAX_ASSOCIATION_PAGE_SIZE,
        )?;
        check_range("images.page_size", self.images.page_size, MAX_ASSOCIATION_PAGE_SIZE)?;
        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(invalid("images.jpeg_quality", "must be between 1 and 100"));
        }
        check_page_size("workflows.page_size", self.workflows.page_size)?;
        if self.workflows.concurrency == 0 {
            return Err(invalid("workflows.concurrency", "must be at least 1"));
        }
        if self.workflows.properties.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid(
                "workflows.properties",
                "property names must not be empty",
            ));
        }
        if self.engagements.concurrency == 0 {
            return Err(invalid("engagements.concurrency", "must be at least 1"));
        }
        if self.engagements.engagement_types.is_empty() {
            return Err(invalid("engagements.engagement_types", "must not be empty"));
        }
        for (object_type, fields) in &self.backfill.date_fields {
            if fields.iter().any(|f| f.trim().is_empty()) {
                return Err(invalid(
                    &format!("backfill.date_fields.{object_type}"),
                    "field names must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Authentication from the configured token
    pub fn auth(&self) -> Result<AuthConfig> {
        match self.hubspot.access_token.as_deref() {
            Some(token) if !token.trim().is_empty() => Ok(AuthConfig::bearer(token)),
            _ => Err(Error::missing_field(format!(
                "hubspot.access_token (set --token or {TOKEN_ENV_VAR})"
            ))),
        }
    }

    /// HTTP client settings derived from this config
    pub fn http_config(&self) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .base_url(&self.hubspot.base_url)
            .timeout(Duration::from_secs(self.hubspot.timeout_seconds))
            .retry(self.retry.to_policy());

        builder = match self.hubspot.rate_limit {
            Some(ref limit) => builder.rate_limit(limit.to_config()),
            None => builder.no_rate_limit(),
        };
        builder.build()
    }

    /// Build an authenticated client
    pub fn client(&self) -> Result<HttpClient> {
        HttpClient::with_auth(self.http_config(), self.auth()?)
    }

    /// Client for absolute URLs outside the API, e.g. file CDN downloads.
    ///
    /// Carries the retry policy but neither the token nor the API throttle.
    pub fn download_client(&self) -> Result<HttpClient> {
        let config = HttpClientConfig::builder()
            .no_base_url()
            .timeout(Duration::from_secs(self.hubspot.timeout_seconds))
            .retry(self.retry.to_policy())
            .no_rate_limit()
            .build();
        HttpClient::with_config(config)
    }
}

fn invalid(field: &str, message: &str) -> Error {
    Error::InvalidConfigValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn check_page_size(field: &str, value: u32) -> Result<()> {
    check_range(field, value, MAX_PAGE_SIZE)
}

fn check_range(field: &str, value: u32, max: u32) -> Result<()> {
    if value == 0 || value > max {
        return Err(invalid(field, &format!("must be between 1 and {max}")));
    }
    Ok(())
}

// ============================================================================
// Connection
// ============================================================================

/// API connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HubspotSettings {
    /// Private app access token
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// API host
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Client-side throttle (`null` disables it)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimitSettings>,
}

impl Default for HubspotSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            rate_limit: default_rate_limit(),
        }
    }
}

impl std::fmt::Debug for HubspotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubspotSettings")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_rate_limit() -> Option<RateLimitSettings> {
    Some(RateLimitSettings::default())
}

/// Requests allowed per rolling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Requests per interval
    pub max_requests: u32,
    /// Interval length in milliseconds
    pub interval_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: 100,
            interval_ms: 10_000,
        }
    }
}

impl RateLimitSettings {
    /// Convert to the limiter configuration
    pub fn to_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.max_requests, Duration::from_millis(self.interval_ms))
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Retry configuration as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry when no `Retry-After` is given
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor per retry
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Backoff curve
    #[serde(default)]
    pub backoff: BackoffType,

    /// Cap on computed delays
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random extra delay, 0 disables
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Honour `Retry-After`
    #[serde(default = "default_true")]
    pub respect_retry_after: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            backoff: BackoffType::default(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            respect_retry_after: true,
        }
    }
}

impl RetrySettings {
    /// Convert to a [`RetryPolicy`]
    pub fn to_policy(&self) -> RetryPolicy {
        let jitter = (self.jitter_ms > 0).then(|| Duration::from_millis(self.jitter_ms));
        RetryPolicy::new(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_multiplier(self.multiplier)
            .with_backoff_type(self.backoff)
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(jitter)
            .with_respect_retry_after(self.respect_retry_after)
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Jobs
// ============================================================================

/// Touchpoint export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TouchpointSettings {
    /// Contacts per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Stop after this many contacts (test mode)
    #[serde(default)]
    pub contact_limit: Option<usize>,

    /// CSV file rows are appended to
    #[serde(default = "default_touchpoints_output")]
    pub output: PathBuf,
}

impl Default for TouchpointSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            contact_limit: None,
            output: default_touchpoints_output(),
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_touchpoints_output() -> PathBuf {
    PathBuf::from("touchpoints.csv")
}

/// Datetime backfill settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillSettings {
    /// Records per page (and per `batch/update`)
    #[serde(default = "default_backfill_page_size")]
    pub page_size: u32,

    /// Custom date properties per object type
    #[serde(default)]
    pub date_fields: BTreeMap<ObjectType, Vec<String>>,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            page_size: default_backfill_page_size(),
            date_fields: BTreeMap::new(),
        }
    }
}

fn default_backfill_page_size() -> u32 {
    50
}

/// Engagement lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementSettings {
    /// Engagement object types to collect
    #[serde(default = "default_engagement_types")]
    pub engagement_types: Vec<String>,

    /// Contacts processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Ids per `batch/read` call
    #[serde(default = "default_page_size")]
    pub batch_size: u32,

    /// Page size for association listings
    #[serde(default = "default_association_page_size")]
    pub association_page_size: u32,
}

impl Default for EngagementSettings {
    fn default() -> Self {
        Self {
            engagement_types: default_engagement_types(),
            concurrency: default_concurrency(),
            batch_size: default_page_size(),
            association_page_size: default_association_page_size(),
        }
    }
}

fn default_engagement_types() -> Vec<String> {
    ["calls", "meetings", "emails"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_concurrency() -> usize {
    crate::pool::DEFAULT_CONCURRENCY
}

fn default_association_page_size() -> u32 {
    500
}

fn default_images_page_size() -> u32 {
    MAX_ASSOCIATION_PAGE_SIZE
}

/// Image recompression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Only files larger than this many bytes are recompressed
    #[serde(default = "default_min_size_bytes")]
    pub min_size_bytes: u64,

    /// Files per listing page
    #[serde(default = "default_images_page_size")]
    pub page_size: u32,

    /// JPEG encoder quality, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Pause between downloads in milliseconds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,

    /// Where recompressed files are written
    #[serde(default = "default_images_dir")]
    pub output_dir: PathBuf,

    /// JSON dump of the full image listing
    #[serde(default = "default_images_listing")]
    pub listing_path: PathBuf,

    /// JSON log of recompressed files, read back by the replace step
    #[serde(default = "default_images_log")]
    pub log_path: PathBuf,

    /// `access` option sent with each replacement
    #[serde(default = "default_access")]
    pub access: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            min_size_bytes: default_min_size_bytes(),
            page_size: default_images_page_size(),
            jpeg_quality: default_jpeg_quality(),
            pause_ms: default_pause_ms(),
            output_dir: default_images_dir(),
            listing_path: default_images_listing(),
            log_path: default_images_log(),
            access: default_access(),
        }
    }
}

fn default_min_size_bytes() -> u64 {
    800_000
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_pause_ms() -> u64 {
    1_000
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("compressed_images")
}

fn default_images_listing() -> PathBuf {
    PathBuf::from("images.json")
}

fn default_images_log() -> PathBuf {
    PathBuf::from("compressed_images_log.json")
}

fn default_access() -> String {
    "PUBLIC_INDEXABLE".to_string()
}

/// Workflow export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Property names a workflow must reference to count as matched
    #[serde(default)]
    pub properties: Vec<String>,

    /// Flows per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Flow details fetched concurrently
    #[serde(default = "default_workflow_concurrency")]
    pub concurrency: usize,

    /// Directory for every enabled flow
    #[serde(default = "default_enabled_dir")]
    pub enabled_dir: PathBuf,

    /// Directory for enabled flows that reference a property
    #[serde(default = "default_matched_dir")]
    pub matched_dir: PathBuf,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            properties: Vec::new(),
            page_size: default_page_size(),
            concurrency: default_workflow_concurrency(),
            enabled_dir: default_enabled_dir(),
            matched_dir: default_matched_dir(),
        }
    }
}

fn default_workflow_concurrency() -> usize {
    5
}

fn default_enabled_dir() -> PathBuf {
    PathBuf::from("enabled_workflows")
}

fn default_matched_dir() -> PathBuf {
    PathBuf::from("matched_workflows")
}
