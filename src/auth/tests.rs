//! Tests for the auth module

use super::*;

#[test]
fn test_no_auth() {
    let auth = Authenticator::new(AuthConfig::None);
    let client = reqwest::Client::new();
    let req = auth.apply(client.get("https://example.com/api"));

    let built = req.build().unwrap();
    assert!(built.headers().get("Authorization").is_none());
}

#[test]
fn test_bearer() {
    let auth = Authenticator::new(AuthConfig::bearer("pat-na1-123"));
    let client = reqwest::Client::new();
    let req = auth.apply(client.get("https://example.com/api"));

    let built = req.build().unwrap();
    assert_eq!(
        built.headers().get("Authorization").unwrap(),
        "Bearer pat-na1-123"
    );
}

#[test]
fn test_debug_redacts_secrets() {
    let debug = format!("{:?}", AuthConfig::bearer("super-secret"));
    assert!(!debug.contains("super-secret"));
    assert!(debug.contains("***"));
}

#[test]
fn test_is_configured() {
    assert!(!AuthConfig::None.is_configured());
    assert!(AuthConfig::bearer("t").is_configured());
}
