//! Tests for the HTTP client module

use super::*;
use crate::auth::AuthConfig;
use crate::error::Error;
use crate::types::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{
    body_json, body_string_contains, header, header_regex, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_policy() -> RetryPolicy {
    RetryPolicy::new(3)
        .with_base_delay(Duration::from_millis(100))
        .with_multiplier(2.0)
        .with_jitter(None)
}

fn test_client(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .retry(test_policy())
        .no_rate_limit()
        .build();
    HttpClient::with_config(config)
        .unwrap()
        .with_sleeper(sleeper)
}

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.base_url.as_deref(), Some(DEFAULT_BASE_URL));
    assert_eq!(config.retry, RetryPolicy::default());
    assert!(config.rate_limit.is_some());
    assert!(config.user_agent.starts_with("hubspot-batch/"));
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.example.com")
        .timeout(Duration::from_secs(60))
        .retry(RetryPolicy::new(7))
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.base_url, Some("https://api.example.com".to_string()));
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_request_config_builder() {
    let mut params = crate::types::StringMap::new();
    params.insert("archived".to_string(), "false".to_string());

    let config = RequestConfig::new()
        .query("limit", "100")
        .queries(&params)
        .header("X-Request-Id", "abc123")
        .json(json!({"inputs": []}))
        .timeout(Duration::from_secs(10));

    assert_eq!(config.query.get("limit"), Some(&"100".to_string()));
    assert_eq!(config.query.get("archived"), Some(&"false".to_string()));
    assert_eq!(
        config.headers.get("X-Request-Id"),
        Some(&"abc123".to_string())
    );
    assert!(config.body.is_some());
    assert_eq!(config.timeout, Some(Duration::from_secs(10)));
}

#[test]
fn test_build_url() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.hubapi.com/")
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    assert_eq!(
        client.build_url("/crm/v3/objects/contacts"),
        "https://api.hubapi.com/crm/v3/objects/contacts"
    );
    assert_eq!(
        client.build_url("https://other.example.com/x"),
        "https://other.example.com/x"
    );
}

#[tokio::test]
async fn test_get_json_with_query_and_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/crm/v3/objects/contacts"))
        .and(query_param("limit", "10"))
        .and(header("Authorization", "Bearer pat-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = test_client(&server, Arc::new(RecordingSleeper::new()));
    client.set_auth(AuthConfig::bearer("pat-123"));

    let body = client
        .get_json(
            "/crm/v3/objects/contacts",
            RequestConfig::new().query("limit", "10"),
        )
        .await
        .unwrap();

    assert_eq!(body, json!({"results": []}));
}

#[tokio::test]
async fn test_send_json_post() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/crm/v3/objects/deals/batch/update"))
        .and(body_json(json!({"inputs": [{"id": "1"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "COMPLETE"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, Arc::new(RecordingSleeper::new()));
    let body = client
        .send_json(
            Method::POST,
            "/crm/v3/objects/deals/batch/update",
            json!({"inputs": [{"id": "1"}]}),
        )
        .await
        .unwrap();

    assert_eq!(body["status"], "COMPLETE");
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/crm/v3/objects/contacts/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = test_client(&server, Arc::new(RecordingSleeper::new()));
    let body = client
        .send_json(Method::PATCH, "/crm/v3/objects/contacts/1", json!({}))
        .await
        .unwrap();

    assert!(body.is_null());
}

#[tokio::test]
async fn test_404_is_fatal_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let err = client
        .get_json("/missing", RequestConfig::new())
        .await
        .unwrap_err();

    match err {
        Error::ClientError { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "Not found");
        }
        other => panic!("Expected ClientError, got {other:?}"),
    }
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_retry_on_500_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let body = client.get_json("/flaky", RequestConfig::new()).await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn test_retry_after_header_drives_delay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "2")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    client.get_json("/limited", RequestConfig::new()).await.unwrap();

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 1);
    assert!(delays[0] >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_oversized_retry_after_falls_back_to_backoff() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1e30"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let body = client.get_json("/limited", RequestConfig::new()).await.unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(100)]);
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({"ok": false})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let body = client
        .get_json(
            "/slow",
            RequestConfig::new().timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(100)]);
}

#[tokio::test]
async fn test_timeouts_exhaust_retries_without_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/stuck"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(3)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let err = client
        .get_json(
            "/stuck",
            RequestConfig::new().timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::RetriesExhausted {
            attempts: 3,
            last_status: None,
            ..
        }
    ));
    assert_eq!(sleeper.delays().len(), 2);
}

#[tokio::test]
async fn test_max_retries_exceeded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/always-fail"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Server error"))
        .expect(3)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let err = client
        .get_json("/always-fail", RequestConfig::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::RetriesExhausted {
            attempts: 3,
            last_status: Some(503),
            ..
        }
    ));
    assert_eq!(sleeper.delays().len(), 2);
}

#[tokio::test]
async fn test_invalid_json_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, Arc::new(RecordingSleeper::new()));
    let err = client
        .get_json("/html", RequestConfig::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_default_and_request_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("X-Default", "a"))
        .and(header("X-Request-Id", "req-456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .header("X-Default", "a")
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    client
        .get_json(
            "/secure",
            RequestConfig::new().header("X-Request-Id", "req-456"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_http_client_with_rate_limiter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(3)
        .mount(&server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .rate_limit(RateLimiterConfig::per_second(100))
        .build();
    let client = HttpClient::with_config(config).unwrap();
    assert!(client.has_rate_limiter());

    for _ in 0..3 {
        client
            .get_json("/api/data", RequestConfig::new())
            .await
            .unwrap();
    }
}

#[test]
fn test_http_client_debug_hides_token() {
    let config = HttpClientConfig::builder().no_rate_limit().build();
    let client = HttpClient::with_auth(config, AuthConfig::bearer("pat-secret")).unwrap();
    let debug_str = format!("{client:?}");
    assert!(debug_str.contains("HttpClient"));
    assert!(!debug_str.contains("pat-secret"));
}

#[tokio::test]
async fn test_get_bytes_returns_raw_body() {
    let server = MockServer::start().await;
    let png_magic = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    Mock::given(method("GET"))
        .and(path("/hubfs/logo.png"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hubfs/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_magic.clone()))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let bytes = client
        .get_bytes(&format!("{}/hubfs/logo.png", server.uri()))
        .await
        .unwrap();

    assert_eq!(bytes, png_magic);
    assert_eq!(sleeper.delays().len(), 1);
}

#[tokio::test]
async fn test_multipart_upload_is_rebuilt_on_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/filemanager/api/v3/files/42/replace"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/filemanager/api/v3/files/42/replace"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .and(body_string_contains("filename=\"42.jpg\""))
        .and(body_string_contains("PUBLIC_INDEXABLE"))
        .and(body_string_contains("jpeg-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42"})))
        .expect(1)
        .mount(&server)
        .await;

    let upload = MultipartUpload::new()
        .file("file", "42.jpg", "application/octet-stream", b"jpeg-bytes".to_vec())
        .json("options", &json!({"access": "PUBLIC_INDEXABLE"}));

    let sleeper = Arc::new(RecordingSleeper::new());
    let client = test_client(&server, sleeper.clone());
    let body = client
        .send_multipart("/filemanager/api/v3/files/42/replace", &upload)
        .await
        .unwrap();

    assert_eq!(body["id"], "42");
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(100)]);
}
