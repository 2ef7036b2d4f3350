//! Writer configuration
//!
//! The configuration arrives as the `parameters` object of the platform's
//! `config.json`. It is validated on the raw JSON first so that every missing
//! field is reported at once, then deserialized into typed structures.

use crate::auth::AuthSpec;
use crate::error::{Error, Result};
use crate::signature::SignatureSpec;
use crate::types::{DataType, JsonObject, Method, RequestContentType};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Top-Level Writer Config
// ============================================================================

/// Complete writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfiguration {
    /// Target API settings
    pub api: ApiConfig,

    /// Values referenced from the rest of the configuration via `{"attr": ..}`
    #[serde(default, deserialize_with = "object_or_empty_list")]
    pub user_parameters: JsonObject,

    /// How each request is made
    pub request_parameters: ApiRequest,

    /// How the input table becomes request payloads
    pub request_content: RequestContent,

    /// Credentials from the platform's OAuth authorization, outside `parameters`
    #[serde(skip)]
    pub oauth_credentials: Option<OAuthCredentials>,
}

// ============================================================================
// Platform OAuth
// ============================================================================

/// Name of the auth method fed by the platform OAuth credentials
const OAUTH_METHOD: &str = "OAuth20ClientCredentials";

/// `authorization.oauth_api.credentials` of `config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCredentials {
    #[serde(rename = "appKey")]
    pub app_key: String,

    #[serde(rename = "#appSecret")]
    pub app_secret: String,

    /// Authorization data, stored by the platform as a JSON string
    #[serde(default, rename = "#data", alias = "data", deserialize_with = "object_or_json_string")]
    pub data: JsonObject,
}

// ============================================================================
// API
// ============================================================================

/// Target API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, may contain `[[column]]` iteration placeholders
    pub base_url: String,

    #[serde(default, deserialize_with = "object_or_empty_list")]
    pub default_query_parameters: JsonObject,

    #[serde(default, deserialize_with = "object_or_empty_list")]
    pub default_headers: JsonObject,

    #[serde(default)]
    pub authentication: Option<AuthSpec>,

    #[serde(default)]
    pub signature: Option<SignatureSpec>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub retry_config: RetryConfig,

    #[serde(default = "default_true")]
    pub ssl_verification: bool,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl ApiConfig {
    /// Effective request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
            .filter(|secs| *secs > 0.0)
            .map_or(Duration::from_secs(default_timeout()), Duration::from_secs_f64)
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Retry settings of the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before retry `n` is `backoff_factor * 2^n` seconds
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Status codes that are retried
    #[serde(default = "default_retry_codes")]
    pub codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            codes: default_retry_codes(),
        }
    }
}

fn default_max_retries() -> u32 {
    1
}

fn default_backoff_factor() -> f64 {
    0.3
}

fn default_retry_codes() -> Vec<u16> {
    vec![500, 502, 504]
}

// ============================================================================
// Request
// ============================================================================

/// Per-request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    #[serde(deserialize_with = "from_str")]
    pub method: Method,

    /// Path joined to the base URL, may contain `[[column]]` placeholders
    pub endpoint_path: String,

    #[serde(default, deserialize_with = "object_or_empty_list")]
    pub headers: JsonObject,

    #[serde(default, deserialize_with = "object_or_empty_list")]
    pub query_parameters: JsonObject,

    /// Log failed requests and carry on instead of stopping the run
    #[serde(default)]
    pub continue_on_failure: bool,
}

// ============================================================================
// Request Content
// ============================================================================

/// Payload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContent {
    pub content_type: RequestContentType,

    #[serde(default)]
    pub json_mapping: Option<JsonMapping>,

    /// Columns whose values parameterise each row's request
    #[serde(default, deserialize_with = "null_as_default")]
    pub iterate_by_columns: Vec<String>,
}

/// CSV to JSON mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonMapping {
    /// Column names are split on this to build nested objects
    pub nesting_delimiter: String,

    /// Rows per request
    pub chunk_size: usize,

    pub column_data_types: ColumnDataTypes,

    /// Template containing `[[data]]` or `{{data}}`
    #[serde(default, deserialize_with = "null_as_default")]
    pub request_data_wrapper: String,

    /// Source column name to output name
    #[serde(default, deserialize_with = "object_or_empty_list")]
    pub column_names_override: JsonObject,
}

/// Column typing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDataTypes {
    /// Infer types of columns without an override
    #[serde(default)]
    pub autodetect: bool,

    /// List of `{column: type}` entries
    #[serde(default, deserialize_with = "null_as_default")]
    pub datatype_override: Vec<HashMap<String, DataType>>,
}

impl ColumnDataTypes {
    /// Overrides flattened into one map
    pub fn overrides(&self) -> HashMap<String, DataType> {
        self.datatype_override
            .iter()
            .flat_map(|entry| entry.iter().map(|(k, v)| (k.clone(), *v)))
            .collect()
    }
}

// ============================================================================
// Deserialization helpers
// ============================================================================

/// The platform stores an empty object as an empty list
fn object_or_empty_list<'de, D>(deserializer: D) -> std::result::Result<JsonObject, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonObject::new()),
        Value::Array(items) if items.is_empty() => Ok(JsonObject::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// An object, or a string holding one
fn object_or_json_string<'de, D>(deserializer: D) -> std::result::Result<JsonObject, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) if text.trim().is_empty() => Ok(JsonObject::new()),
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(serde::de::Error::custom(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(e) => Err(serde::de::Error::custom(e)),
        },
        Value::Object(map) => Ok(map),
        Value::Null => Ok(JsonObject::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected an object, got {other}"
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn from_str<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

// ============================================================================
// Validation and loading
// ============================================================================

const ROOT_FIELDS: &[&str] = &["api", "request_content", "request_parameters"];
const API_FIELDS: &[&str] = &["base_url"];
const REQUEST_FIELDS: &[&str] = &["method", "endpoint_path"];
const CONTENT_FIELDS: &[&str] = &["content_type"];
const JSON_MAPPING_FIELDS: &[&str] = &["nesting_delimiter", "chunk_size", "column_data_types"];

fn missing_fields(object: &Value, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|field| object.get(**field).is_none())
        .map(|field| (*field).to_string())
        .collect()
}

fn object_error(name: &str, object: &Value, required: &[&str]) -> Option<String> {
    let missing = missing_fields(object, required);
    (!missing.is_empty())
        .then(|| format!("Object \"{name}\" is missing following required fields: {missing:?}"))
}

/// Check the raw parameters, reporting every missing field at once
pub fn validate_parameters(parameters: &Value) -> Result<()> {
    if !parameters.is_object() {
        return Err(Error::config("configuration parameters must be an object"));
    }
    if parameters.get("path").is_some() {
        return Err(Error::config(
            "The legacy v1 configuration format is not supported, convert it to the current format",
        ));
    }

    let missing = missing_fields(parameters, ROOT_FIELDS);
    if !missing.is_empty() {
        return Err(Error::validation(format!(
            "Configuration is missing following required fields: {missing:?}"
        )));
    }

    let api = &parameters["api"];
    let request_parameters = &parameters["request_parameters"];
    let request_content = &parameters["request_content"];

    let mut errors: Vec<String> = [
        object_error("api", api, API_FIELDS),
        object_error("request_parameters", request_parameters, REQUEST_FIELDS),
        object_error("request_content", request_content, CONTENT_FIELDS),
    ]
    .into_iter()
    .flatten()
    .collect();

    let json_mapping = request_content.get("json_mapping").filter(|v| !v.is_null());
    if let Some(content_type) = request_content.get("content_type").and_then(Value::as_str) {
        if matches!(content_type, "JSON" | "JSON_URL_ENCODED") && json_mapping.is_none() {
            errors.push(format!(
                "The 'json_mapping' configuration is required in mode {content_type}"
            ));
        }
    }
    if let Some(json_mapping) = json_mapping {
        errors.extend(object_error("json_mapping", json_mapping, JSON_MAPPING_FIELDS));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errors.join("\n")))
    }
}

/// Validate and deserialize the writer parameters
pub fn build_configuration(parameters: &Value) -> Result<WriterConfiguration> {
    validate_parameters(parameters)?;
    let config: WriterConfiguration = serde_json::from_value(parameters.clone())
        .map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;

    if let Some(mapping) = &config.request_content.json_mapping {
        if mapping.chunk_size == 0 {
            return Err(Error::config("json_mapping.chunk_size must be at least 1"));
        }
    }
    let backoff_factor = config.api.retry_config.backoff_factor;
    if Duration::try_from_secs_f64(backoff_factor).is_err() {
        return Err(Error::config(format!(
            "retry_config.backoff_factor must be a non-negative number of seconds, got {backoff_factor}"
        )));
    }
    debug!(
        "Configuration loaded: {} {}",
        config.request_parameters.method, config.request_parameters.endpoint_path
    );
    Ok(config)
}

impl WriterConfiguration {
    /// Load `<data_dir>/config.json` and build the configuration from its `parameters`
    pub fn from_data_dir(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("Cannot read {}: {e}", path.display())))?;
        let document: Value = serde_json::from_str(&content)?;
        let parameters = document
            .get("parameters")
            .ok_or_else(|| Error::validation(format!("{} has no \"parameters\"", path.display())))?;
        let config = build_configuration(parameters)?;

        match document.pointer("/authorization/oauth_api/credentials") {
            Some(credentials) if !credentials.is_null() => {
                let credentials: OAuthCredentials = serde_json::from_value(credentials.clone())
                    .map_err(|e| Error::config(format!("Invalid OAuth credentials: {e}")))?;
                debug!("Using platform OAuth credentials of app {}", credentials.app_key);
                Ok(config.with_oauth_credentials(credentials))
            }
            _ => Ok(config),
        }
    }

    /// Attach platform OAuth credentials
    ///
    /// For `OAuth20ClientCredentials` the app key, app secret and scopes
    /// replace the matching authentication parameters.
    #[must_use]
    pub fn with_oauth_credentials(mut self, credentials: OAuthCredentials) -> Self {
        if let Some(auth) = self
            .api
            .authentication
            .as_mut()
            .filter(|auth| auth.auth_type == OAUTH_METHOD)
        {
            let parameters = &mut auth.parameters;
            parameters.insert("client_id".into(), credentials.app_key.clone().into());
            parameters.insert("#client_secret".into(), credentials.app_secret.clone().into());
            if let Some(scopes) = credentials.data.get("scopes") {
                parameters.insert("scopes".into(), scopes.clone());
            }
        }
        self.oauth_credentials = Some(credentials);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn minimal() -> Value {
        json!({
            "api": {"base_url": "https://api.example.com"},
            "request_parameters": {"method": "POST", "endpoint_path": "/users"},
            "request_content": {
                "content_type": "JSON",
                "json_mapping": {
                    "nesting_delimiter": "__",
                    "chunk_size": 10,
                    "column_data_types": {"autodetect": true}
                }
            }
        })
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = build_configuration(&minimal()).unwrap();

        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.retry_config, RetryConfig::default());
        assert!(config.api.ssl_verification);
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert!(config.api.authentication.is_none());
        assert_eq!(config.request_parameters.method, Method::POST);
        assert!(!config.request_parameters.continue_on_failure);
        assert!(config.user_parameters.is_empty());
        assert!(config.request_content.iterate_by_columns.is_empty());

        let mapping = config.request_content.json_mapping.unwrap();
        assert_eq!(mapping.chunk_size, 10);
        assert_eq!(mapping.request_data_wrapper, "");
        assert!(mapping.column_data_types.autodetect);
    }

    #[test]
    fn test_parse_full_config() {
        let config = build_configuration(&json!({
            "api": {
                "base_url": "https://api.example.com/[[id]]",
                "default_headers": {"Accept": "application/json"},
                "default_query_parameters": [],
                "authentication": {"type": "BearerToken", "parameters": {"#token": {"attr": "#t"}}},
                "signature": {"type": "HMAC", "parameters": {"concat_values": ["$body"]}},
                "retry_config": {"max_retries": 5, "codes": [429]},
                "ssl_verification": false,
                "timeout": 2.5
            },
            "user_parameters": {"#t": "secret"},
            "request_parameters": {
                "method": "put",
                "endpoint_path": "/items",
                "query_parameters": [],
                "continue_on_failure": true
            },
            "request_content": {
                "content_type": "BINARY_GZ",
                "iterate_by_columns": ["id"]
            }
        }))
        .unwrap();

        assert_eq!(config.api.retry_config.max_retries, 5);
        assert_eq!(config.api.retry_config.backoff_factor, 0.3);
        assert_eq!(config.api.retry_config.codes, vec![429]);
        assert_eq!(config.api.timeout(), Duration::from_millis(2500));
        assert!(config.api.default_query_parameters.is_empty());
        assert_eq!(config.api.authentication.unwrap().auth_type, "BearerToken");
        assert_eq!(config.api.signature.unwrap().auth_type, "HMAC");
        assert_eq!(config.request_parameters.method, Method::PUT);
        assert!(config.request_parameters.continue_on_failure);
        assert_eq!(config.request_content.content_type, RequestContentType::BinaryGz);
        assert_eq!(config.request_content.iterate_by_columns, vec!["id"]);
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let err = build_configuration(&json!({
            "api": {},
            "request_parameters": {"method": "POST"},
            "request_content": {"content_type": "JSON", "json_mapping": {"chunk_size": 1}}
        }))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Some required parameters fields are missing:"));
        assert!(message.contains(r#"Object "api" is missing following required fields: ["base_url"]"#));
        assert!(message.contains(
            r#"Object "request_parameters" is missing following required fields: ["endpoint_path"]"#
        ));
        assert!(message.contains(
            r#"Object "json_mapping" is missing following required fields: ["nesting_delimiter", "column_data_types"]"#
        ));
    }

    #[test]
    fn test_missing_root_fields() {
        let err = build_configuration(&json!({"api": {"base_url": "x"}})).unwrap_err();
        assert!(err
            .to_string()
            .contains(r#"["request_content", "request_parameters"]"#));
    }

    #[test]
    fn test_json_mapping_required_in_json_mode() {
        let mut params = minimal();
        params["request_content"] = json!({"content_type": "JSON_URL_ENCODED"});
        let err = build_configuration(&params).unwrap_err();
        assert!(err
            .to_string()
            .contains("The 'json_mapping' configuration is required in mode JSON_URL_ENCODED"));

        params["request_content"] = json!({"content_type": "EMPTY_REQUEST"});
        assert!(build_configuration(&params).is_ok());
    }

    #[test]
    fn test_legacy_config_rejected() {
        let err = build_configuration(&json!({"path": "https://x", "mode": "JSON"})).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_datatype_overrides() {
        let mut params = minimal();
        params["request_content"]["json_mapping"]["column_data_types"] = json!({
            "datatype_override": [{"age": "number"}, {"active": "bool"}]
        });
        let config = build_configuration(&params).unwrap();
        let overrides = config
            .request_content
            .json_mapping
            .unwrap()
            .column_data_types
            .overrides();
        assert_eq!(overrides.get("age"), Some(&DataType::Number));
        assert_eq!(overrides.get("active"), Some(&DataType::Bool));
    }

    #[test]
    fn test_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            json!({"parameters": minimal()}).to_string(),
        )
        .unwrap();

        let config = WriterConfiguration::from_data_dir(dir.path()).unwrap();
        assert_eq!(config.request_parameters.endpoint_path, "/users");

        let empty = tempfile::tempdir().unwrap();
        assert!(WriterConfiguration::from_data_dir(empty.path()).is_err());
    }

    #[test]
    fn test_backoff_factor_must_fit_a_duration() {
        for factor in [json!(-1.0), json!(1e300)] {
            let mut params = minimal();
            params["api"]["retry_config"] = json!({"backoff_factor": factor});
            let err = build_configuration(&params).unwrap_err();
            assert!(err.to_string().contains("backoff_factor"), "{err}");
        }
    }

    #[test]
    fn test_platform_oauth_credentials_fill_auth_parameters() {
        let mut params = minimal();
        params["api"]["authentication"] = json!({
            "type": "OAuth20ClientCredentials",
            "parameters": {"login_endpoint": "https://auth.example.com/token"}
        });
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            json!({
                "parameters": params,
                "authorization": {"oauth_api": {"credentials": {
                    "id": "main",
                    "appKey": "app-id",
                    "#appSecret": "app-secret",
                    "#data": "{\"scopes\": [\"read\", \"write\"]}"
                }}}
            })
            .to_string(),
        )
        .unwrap();

        let config = WriterConfiguration::from_data_dir(dir.path()).unwrap();
        let auth = config.api.authentication.unwrap();
        assert_eq!(
            Value::Object(auth.parameters),
            json!({
                "login_endpoint": "https://auth.example.com/token",
                "client_id": "app-id",
                "#client_secret": "app-secret",
                "scopes": ["read", "write"]
            })
        );
        assert_eq!(config.oauth_credentials.unwrap().app_key, "app-id");
    }

    #[test]
    fn test_platform_oauth_credentials_ignored_by_other_methods() {
        let mut params = minimal();
        params["api"]["authentication"] = json!({
            "type": "BearerToken",
            "parameters": {"#token": "t"}
        });
        let credentials: OAuthCredentials = serde_json::from_value(json!({
            "appKey": "k",
            "#appSecret": "s",
            "#data": ""
        }))
        .unwrap();
        assert!(credentials.data.is_empty());

        let config = build_configuration(&params)
            .unwrap()
            .with_oauth_credentials(credentials);
        assert_eq!(
            Value::Object(config.api.authentication.unwrap().parameters),
            json!({"#token": "t"})
        );
    }
}
