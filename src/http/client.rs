//! HTTP client with retry and rate limiting
//!
//! Provides an HTTP client that handles:
//! - Automatic retries through [`RetryExecutor`]
//! - Rate limiting to stay under the API's rolling window
//! - JSON body parsing, raw downloads and multipart uploads
//! - Error classification for retry decisions

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::retry::{
    classify_status, parse_retry_after, AttemptOutcome, RetryExecutor, RetryPolicy,
    RetryableKind, Sleeper,
};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use crate::types::{Method, StringMap};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default CRM API host
pub const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative paths
    pub base_url: Option<String>,
    /// Per-call timeout
    pub timeout: Duration,
    /// Retry policy for every request
    pub retry: RetryPolicy,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: HashMap::new(),
            user_agent: format!("hubspot-batch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Require absolute URLs on every request
    pub fn no_base_url(mut self) -> Self {
        self.config.base_url = None;
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: StringMap,
    /// Request headers
    pub headers: StringMap,
    /// Request body (JSON)
    pub body: Option<Value>,
    /// Override timeout for this request
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add several query parameters
    #[must_use]
    pub fn queries(mut self, params: &StringMap) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful response with its JSON body decoded
#[derive(Debug, Clone)]
pub struct JsonResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Parsed body (`Null` for an empty body)
    pub body: Value,
}

/// A file upload sent as `multipart/form-data`.
///
/// `reqwest::multipart::Form` is consumed by sending, so the form is rebuilt
/// from these parts on every attempt.
#[derive(Debug, Clone, Default)]
pub struct MultipartUpload {
    parts: Vec<UploadPart>,
}

#[derive(Debug, Clone)]
struct UploadPart {
    name: String,
    file_name: Option<String>,
    mime: String,
    data: Vec<u8>,
}

impl MultipartUpload {
    /// Create an empty upload
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(UploadPart {
            name: name.into(),
            file_name: Some(file_name.into()),
            mime: mime.into(),
            data,
        });
        self
    }

    /// Add a JSON field
    #[must_use]
    pub fn json(mut self, name: impl Into<String>, value: &Value) -> Self {
        self.parts.push(UploadPart {
            name: name.into(),
            file_name: None,
            mime: "application/json".to_string(),
            data: value.to_string().into_bytes(),
        });
        self
    }

    /// Build a fresh form for one attempt
    pub fn to_form(&self) -> Result<Form> {
        let mut form = Form::new();
        for part in &self.parts {
            let mut body = Part::bytes(part.data.clone()).mime_str(&part.mime)?;
            if let Some(ref file_name) = part.file_name {
                body = body.file_name(file_name.clone());
            }
            form = form.part(part.name.clone(), body);
        }
        Ok(form)
    }
}

/// A successful response with the body left undecoded
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Body bytes
    pub body: Vec<u8>,
}

impl RawResponse {
    fn into_json(self, full_url: &str) -> AttemptOutcome<JsonResponse> {
        let body = if self.body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            match serde_json::from_slice(&self.body) {
                Ok(value) => value,
                Err(e) => {
                    return AttemptOutcome::Fatal(Error::malformed(format!(
                        "response from {full_url} is not valid JSON: {e}"
                    )))
                }
            }
        };

        AttemptOutcome::Success(JsonResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

/// HTTP client with retry and rate limiting
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Authenticator,
    rate_limiter: Option<RateLimiter>,
    retry: RetryExecutor,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);
        let retry = RetryExecutor::new(config.retry.clone());

        Ok(Self {
            client,
            config,
            authenticator: Authenticator::default(),
            rate_limiter,
            retry,
        })
    }

    /// Create a client with authentication
    pub fn with_auth(config: HttpClientConfig, auth_config: AuthConfig) -> Result<Self> {
        let mut client = Self::with_config(config)?;
        client.set_auth(auth_config);
        Ok(client)
    }

    /// Set the authenticator
    pub fn set_auth(&mut self, auth_config: AuthConfig) {
        self.authenticator = Authenticator::new(auth_config);
    }

    /// Replace the sleeper used between retries
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = RetryExecutor::with_sleeper(self.config.retry.clone(), sleeper);
        self
    }

    /// Share an existing rate limiter (e.g. across worker pool tasks)
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Get the retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Make a GET request and return the JSON body
    pub async fn get_json(&self, url: &str, config: RequestConfig) -> Result<Value> {
        Ok(self.request(Method::GET, url, config).await?.body)
    }

    /// Send a JSON body (POST/PATCH) and return the JSON response body
    pub async fn send_json(&self, method: Method, url: &str, body: Value) -> Result<Value> {
        Ok(self
            .request(method, url, RequestConfig::new().json(body))
            .await?
            .body)
    }

    /// Make a request, retrying per the configured policy
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        config: RequestConfig,
    ) -> Result<JsonResponse> {
        let full_url = self.build_url(url);
        let label = format!("{method} {full_url}");

        self.retry
            .run(&label, |_| self.attempt(method, &full_url, &config))
            .await
    }

    /// Download a body as bytes, retrying per the configured policy
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let full_url = self.build_url(url);
        let label = format!("GET {full_url}");
        let config = RequestConfig::new();

        let response = self
            .retry
            .run(&label, |_| self.send_once(Method::GET, &full_url, &config, None))
            .await?;
        Ok(response.body)
    }

    /// POST a multipart upload and return the JSON response body
    pub async fn send_multipart(&self, url: &str, upload: &MultipartUpload) -> Result<Value> {
        let full_url = self.build_url(url);
        let label = format!("POST {full_url} (multipart)");

        let response = self
            .retry
            .run(&label, |_| self.multipart_attempt(&full_url, upload))
            .await?;
        Ok(response.body)
    }

    async fn multipart_attempt(
        &self,
        full_url: &str,
        upload: &MultipartUpload,
    ) -> AttemptOutcome<JsonResponse> {
        let form = match upload.to_form() {
            Ok(form) => form,
            Err(e) => return AttemptOutcome::Fatal(e),
        };
        self.send_once(Method::POST, full_url, &RequestConfig::new(), Some(form))
            .await
            .and_then(|raw| raw.into_json(full_url))
    }

    /// Perform exactly one attempt and classify its outcome
    pub async fn attempt(
        &self,
        method: Method,
        full_url: &str,
        config: &RequestConfig,
    ) -> AttemptOutcome<JsonResponse> {
        self.send_once(method, full_url, config, None)
            .await
            .and_then(|raw| raw.into_json(full_url))
    }

    /// One request; a 2xx keeps its raw body
    async fn send_once(
        &self,
        method: Method,
        full_url: &str,
        config: &RequestConfig,
        form: Option<Form>,
    ) -> AttemptOutcome<RawResponse> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self.client.request(method.into(), full_url);

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        for (key, value) in &config.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if !config.query.is_empty() {
            req = req.query(&config.query);
        }
        if let Some(form) = form {
            req = req.multipart(form);
        } else if let Some(ref body) = config.body {
            req = req.json(body);
        }
        if let Some(timeout) = config.timeout {
            req = req.timeout(timeout);
        }
        req = self.authenticator.apply(req);

        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => return transport_outcome(e),
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => return transport_outcome(e),
        };

        if !(200..300).contains(&status) {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return classify_status(status, retry_after, String::from_utf8_lossy(&body).into_owned());
        }

        debug!("Request succeeded: {} {} ({})", method, full_url, status);
        AttemptOutcome::Success(RawResponse {
            status,
            headers,
            body,
        })
    }

    /// Build full URL from path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("auth", self.authenticator.config())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Timeouts and connection failures are retried, other transport errors are fatal
fn transport_outcome<T>(e: reqwest::Error) -> AttemptOutcome<T> {
    if e.is_timeout() || e.is_connect() {
        AttemptOutcome::Retryable {
            kind: RetryableKind::Transport,
            status: None,
            retry_after: None,
            body: e.to_string(),
        }
    } else {
        AttemptOutcome::Fatal(Error::Http(e))
    }
}
