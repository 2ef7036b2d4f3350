//! Tests for the auth module

use super::*;
use crate::error::Error;
use crate::http::{PreparedRequest, RequestBody};
use crate::signature::{Hmac, SignatureMethod};
use crate::types::{JsonObject, Method};
use base64::Engine;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn params(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn request() -> PreparedRequest {
    PreparedRequest::new(Method::GET, "https://example.com/api?page=1").unwrap()
}

async fn authenticated(auth_type: &str, parameters: Value) -> Authenticator {
    let mut auth = AuthMethodBuilder::build(auth_type, &params(parameters)).unwrap();
    auth.login().await.unwrap();
    auth
}

#[test]
fn test_build_basic_http() {
    let auth =
        AuthMethodBuilder::build("BasicHttp", &params(json!({"username": "usr", "#password": "test"})))
            .unwrap();

    match auth.method() {
        AuthMethod::BasicHttp(basic) => assert_eq!(basic, &BasicHttp::new("usr", "test")),
        other => panic!("unexpected method {other:?}"),
    }
}

#[test]
fn test_build_missing_parameter() {
    let err = AuthMethodBuilder::build("BasicHttp", &params(json!({"#password": "test"})))
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Some arguments of method BasicHttp are missing: [username]"
    );
}

#[test]
fn test_build_secret_without_prefix_is_missing() {
    let err = AuthMethodBuilder::build("BearerToken", &params(json!({"token": "abc"}))).unwrap_err();
    match err {
        Error::MissingAuthParameter { missing, .. } => assert_eq!(missing, vec!["#token"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_build_unsupported_type() {
    let err = AuthMethodBuilder::build("INVALID", &JsonObject::new()).unwrap_err();
    match err {
        Error::UnsupportedAuthType { name, supported } => {
            assert_eq!(name, "INVALID");
            assert_eq!(
                supported,
                vec![
                    "ApiKey",
                    "BasicHttp",
                    "BearerToken",
                    "Login",
                    "NoAuthentication",
                    "OAuth20ClientCredentials"
                ]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_api_key_position_validated_at_build() {
    let err = AuthMethodBuilder::build(
        "ApiKey",
        &params(json!({"key": "k", "#token": "t", "position": "cookie"})),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedPosition { .. }));
}

#[test]
fn test_authorize_before_login_fails() {
    let auth = AuthMethodBuilder::build("BearerToken", &params(json!({"#token": "abc"}))).unwrap();
    let mut req = request();
    assert!(matches!(
        auth.authorize(&mut req).unwrap_err(),
        Error::NotAuthenticated
    ));
    assert!(req.header("Authorization").is_none());
}

#[tokio::test]
async fn test_no_auth() {
    let auth = authenticated("NoAuthentication", json!({})).await;
    let mut req = request();
    auth.authorize(&mut req).unwrap();

    assert!(req.headers.is_empty());
    assert_eq!(req.url.as_str(), "https://example.com/api?page=1");
    assert!(auth.secrets().is_empty());
}

#[tokio::test]
async fn test_basic_auth() {
    let auth = authenticated("BasicHttp", json!({"username": "user", "#password": "pass"})).await;
    let mut req = request();
    auth.authorize(&mut req).unwrap();

    let auth_header = req.header("Authorization").unwrap();
    let encoded = auth_header.strip_prefix("Basic ").unwrap();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .unwrap();
    assert_eq!(String::from_utf8(decoded).unwrap(), "user:pass");

    let secrets = auth.secrets();
    assert!(secrets.contains(&"pass".to_string()));
    assert!(secrets.contains(&encoded.to_string()));
}

#[tokio::test]
async fn test_bearer_auth() {
    let auth = authenticated("BearerToken", json!({"#token": "my-bearer-token"})).await;
    let mut req = request();
    auth.authorize(&mut req).unwrap();

    assert_eq!(req.header("Authorization").unwrap(), "Bearer my-bearer-token");
    assert_eq!(auth.secrets(), vec!["my-bearer-token"]);
}

#[tokio::test]
async fn test_api_key_header() {
    let auth = authenticated(
        "ApiKey",
        json!({"key": "X-API-Key", "#token": "test-key-123", "position": "headers"}),
    )
    .await;
    let mut req = request();
    auth.authorize(&mut req).unwrap();

    assert_eq!(req.header("X-API-Key").unwrap(), "test-key-123");
}

#[tokio::test]
async fn test_api_key_query() {
    let auth = authenticated(
        "ApiKey",
        json!({"key": "apikey", "#token": "secret123", "position": "query"}),
    )
    .await;
    let mut req = request();
    auth.authorize(&mut req).unwrap();

    assert_eq!(
        req.query_pairs(),
        vec![
            ("page".to_string(), "1".to_string()),
            ("apikey".to_string(), "secret123".to_string())
        ]
    );
}

#[tokio::test]
async fn test_login_injects_response_value() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"username": "u", "password": "p"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "XYZ"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut auth = AuthMethodBuilder::build(
        "Login",
        &params(json!({
            "loginRequest": {
                "endpoint": format!("{}/login", server.uri()),
                "method": "POST",
                "body": {"username": "u", "password": "p"}
            },
            "apiRequest": {
                "headers": {"Authorization": {"response": "access_token"}}
            }
        })),
    )
    .unwrap();

    let mut req = request();
    assert!(matches!(
        auth.authorize(&mut req).unwrap_err(),
        Error::NotAuthenticated
    ));

    auth.login().await.unwrap();
    auth.authorize(&mut req).unwrap();

    assert_eq!(req.header("Authorization").unwrap(), "XYZ");
    assert_eq!(auth.secrets(), vec!["XYZ"]);
}

#[tokio::test]
async fn test_login_functions_and_query_injection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/session"))
        .and(query_param("user", "admin"))
        .and(header("X-Client", "writer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"token": "abc"},
            "session": {"id": 42}
        })))
        .mount(&server)
        .await;

    let auth = authenticated(
        "Login",
        json!({
            "login_endpoint": format!("{}/session", server.uri()),
            "login_query_parameters": {"user": "admin"},
            "login_headers": {"X-Client": {"function": "concat", "args": ["wri", "ter"]}},
            "api_request_headers": {
                "Authorization": {"function": "concat", "args": ["Bearer ", {"response": "data.token"}]}
            },
            "api_request_query_parameters": {
                "sid": {"response": "session.id"},
                "missing": {"response": "data.nope"}
            }
        }),
    )
    .await;

    let mut req = request();
    auth.authorize(&mut req).unwrap();

    assert_eq!(req.header("Authorization").unwrap(), "Bearer abc");
    assert_eq!(
        req.query_pairs(),
        vec![
            ("page".to_string(), "1".to_string()),
            ("sid".to_string(), "42".to_string()),
            ("missing".to_string(), String::new())
        ]
    );
}

#[tokio::test]
async fn test_login_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("user=admin"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "T"})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = authenticated(
        "Login",
        json!({
            "loginRequest": {
                "endpoint": format!("{}/login", server.uri()),
                "method": "POST",
                "content_type": "form",
                "body": {"user": "admin"}
            },
            "apiRequest": {"query_parameters": {"token": {"response": "token"}}}
        }),
    )
    .await;

    let mut req = request();
    auth.authorize(&mut req).unwrap();
    assert!(req.url.as_str().ends_with("token=T"));
}

#[tokio::test]
async fn test_login_failure_status() {
    let server = MockServer::start().await;
    Mock::given(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let mut auth = AuthMethodBuilder::build(
        "Login",
        &params(json!({"login_endpoint": format!("{}/login", server.uri())})),
    )
    .unwrap();

    let err = auth.login().await.unwrap_err();
    match err {
        Error::Handshake { message } => {
            assert!(message.contains("401"));
            assert!(message.contains("bad credentials"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn test_login_non_json_response() {
    let server = MockServer::start().await;
    Mock::given(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let mut auth = AuthMethodBuilder::build(
        "Login",
        &params(json!({"login_endpoint": format!("{}/login", server.uri())})),
    )
    .unwrap();

    assert!(matches!(
        auth.login().await.unwrap_err(),
        Error::Handshake { .. }
    ));
}

#[tokio::test]
async fn test_oauth_client_secret_basic() {
    let server = MockServer::start().await;
    let credential = base64::engine::general_purpose::STANDARD.encode("client:s3cret");
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("Authorization", format!("Basic {credential}").as_str()))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=read+write"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "T0K"})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = authenticated(
        "OAuth20ClientCredentials",
        json!({
            "client_id": "client",
            "#client_secret": "s3cret",
            "scopes": ["read", "write"],
            "loginRequest": {"endpoint": format!("{}/token", server.uri())},
            "apiRequest": {
                "headers": {
                    "Authorization": {"function": "concat", "args": ["Bearer ", {"response": "access_token"}]}
                }
            }
        }),
    )
    .await;

    let mut req = request();
    auth.authorize(&mut req).unwrap();
    assert_eq!(req.header("Authorization").unwrap(), "Bearer T0K");

    let secrets = auth.secrets();
    assert!(secrets.contains(&"s3cret".to_string()));
    assert!(secrets.contains(&credential));
    assert!(secrets.contains(&"Bearer T0K".to_string()));
}

#[tokio::test]
async fn test_oauth_client_secret_post_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_json(json!({
            "grant_type": "client_credentials",
            "client_id": "client",
            "client_secret": "s3cret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "J"})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = authenticated(
        "OAuth20ClientCredentials",
        json!({
            "client_id": "client",
            "#client_secret": "s3cret",
            "auth_type": "client_secret_post_json",
            "login_endpoint": format!("{}/token", server.uri()),
            "api_request_headers": {"Authorization": {"response": "access_token"}}
        }),
    )
    .await;

    let mut req = request();
    auth.authorize(&mut req).unwrap();
    assert_eq!(req.header("Authorization").unwrap(), "J");
}

#[tokio::test]
async fn test_oauth_client_secret_post_form_uses_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(query_param("grant_type", "client_credentials"))
        .and(query_param("client_id", "client"))
        .and(query_param("client_secret", "s3cret"))
        .and(query_param("scope", "read"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "F"})))
        .expect(1)
        .mount(&server)
        .await;

    let auth = authenticated(
        "OAuth20ClientCredentials",
        json!({
            "client_id": "client",
            "#client_secret": "s3cret",
            "auth_type": "client_secret_post_form",
            "scopes": ["read"],
            "login_endpoint": format!("{}/token", server.uri()),
            "api_request_headers": {"Authorization": {"response": "access_token"}}
        }),
    )
    .await;

    match auth.method() {
        AuthMethod::OAuth20ClientCredentials(oauth) => assert!(oauth.login.request.body.is_none()),
        other => panic!("unexpected method {other:?}"),
    }
    let mut req = request();
    auth.authorize(&mut req).unwrap();
    assert_eq!(req.header("Authorization").unwrap(), "F");
}

#[test]
fn test_oauth_missing_parameters_listed_together() {
    let err = AuthMethodBuilder::build("OAuth20ClientCredentials", &JsonObject::new()).unwrap_err();
    match err {
        Error::MissingAuthParameter { method, missing } => {
            assert_eq!(method, "OAuth20ClientCredentials");
            assert_eq!(missing, vec!["client_id", "#client_secret", "login_endpoint"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_from_spec_resolves_user_parameters() {
    let spec = AuthSpec {
        auth_type: "BasicHttp".into(),
        parameters: params(json!({"username": {"attr": "user"}, "#password": {"attr": "#pass"}})),
    };
    let user_params = params(json!({"user": "admin", "#pass": "pw"}));

    let auth = AuthMethodBuilder::from_spec(Some(&spec), &user_params).unwrap();
    match auth.method() {
        AuthMethod::BasicHttp(basic) => assert_eq!(basic, &BasicHttp::new("admin", "pw")),
        other => panic!("unexpected method {other:?}"),
    }

    let none = AuthMethodBuilder::from_spec(None, &user_params).unwrap();
    assert!(matches!(none.method(), AuthMethod::NoAuthentication));
}

#[tokio::test]
async fn test_prepare_authorizes_then_signs() {
    let mut auth = AuthMethodBuilder::build("BearerToken", &params(json!({"#token": "abc"})))
        .unwrap()
        .with_signature(SignatureMethod::Hmac(Hmac::new(vec!["x".into()], "sig")));
    auth.login().await.unwrap();

    let mut req = PreparedRequest::new(Method::POST, "https://example.com/api").unwrap();
    req.body = RequestBody::Json(json!({"a": 1}));
    auth.prepare(&mut req).unwrap();

    assert_eq!(req.header("Authorization").unwrap(), "Bearer abc");
    let RequestBody::Json(body) = &req.body else {
        panic!("body must stay JSON")
    };
    assert!(body.get("sig").is_some());
}

#[test]
fn test_flatten_prefers_flat_names() {
    let flat = builder::flatten_login_parameters(&params(json!({
        "login_endpoint": "https://flat",
        "loginRequest": {"endpoint": "https://nested", "headers": {"a": "b"}},
        "apiRequest": {"query_parameters": {"q": "1"}}
    })));

    assert_eq!(flat["login_endpoint"], json!("https://flat"));
    assert_eq!(flat["login_headers"], json!({"a": "b"}));
    assert_eq!(flat["api_request_query_parameters"], json!({"q": "1"}));
    assert!(!flat.contains_key("loginRequest"));
}

#[test]
fn test_lookup_path() {
    let body = json!({"data": {"items": [{"id": 7}]}, "token": "t"});
    assert_eq!(lookup_path(&body, "token"), Some(&json!("t")));
    assert_eq!(lookup_path(&body, "$.data.items.0.id"), Some(&json!(7)));
    assert_eq!(lookup_path(&body, "data.missing"), None);
}
