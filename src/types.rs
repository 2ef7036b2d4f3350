//! Common types used throughout the writer
//!
//! This module contains shared type definitions, type aliases,
//! and small enums used across multiple modules.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "PATCH" => Ok(Method::PATCH),
            "DELETE" => Ok(Method::DELETE),
            other => Err(Error::config(format!("Unsupported HTTP method '{other}'"))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::PUT => reqwest::Method::PUT,
            Method::PATCH => reqwest::Method::PATCH,
            Method::DELETE => reqwest::Method::DELETE,
        }
    }
}

// ============================================================================
// Content Types
// ============================================================================

/// Encoding of a login request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// `application/json`
    #[default]
    Json,
    /// `application/x-www-form-urlencoded`
    Form,
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "application/json" => Ok(ContentType::Json),
            "form" | "application/x-www-form-urlencoded" => Ok(ContentType::Form),
            other => Err(Error::config(format!(
                "Unsupported login content type '{other}', supported values are: [json, form]"
            ))),
        }
    }
}

/// How the input table is turned into request payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestContentType {
    /// Chunked JSON body
    #[serde(rename = "JSON")]
    Json,
    /// One row per request, sent as form data
    #[serde(rename = "JSON_URL_ENCODED")]
    JsonUrlEncoded,
    /// Raw file body
    #[serde(rename = "BINARY")]
    Binary,
    /// Gzip compressed file body
    #[serde(rename = "BINARY_GZ", alias = "BINARY-GZ")]
    BinaryGz,
    /// Request without body
    #[serde(rename = "EMPTY_REQUEST")]
    EmptyRequest,
}

impl RequestContentType {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonUrlEncoded)
    }
}

impl fmt::Display for RequestContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Json => "JSON",
            Self::JsonUrlEncoded => "JSON_URL_ENCODED",
            Self::Binary => "BINARY",
            Self::BinaryGz => "BINARY_GZ",
            Self::EmptyRequest => "EMPTY_REQUEST",
        };
        f.write_str(name)
    }
}

/// Column data type used by the CSV to JSON conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    String,
    Number,
    Object,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_conversion() {
        let get: reqwest::Method = Method::GET.into();
        assert_eq!(reqwest::Method::GET, get);
        let post: reqwest::Method = Method::POST.into();
        assert_eq!(reqwest::Method::POST, post);
    }

    #[test]
    fn test_method_from_str_is_case_insensitive() {
        assert_eq!("post".parse::<Method>().unwrap(), Method::POST);
        assert_eq!("Patch".parse::<Method>().unwrap(), Method::PATCH);
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[test]
    fn test_content_type_from_str() {
        assert_eq!("json".parse::<ContentType>().unwrap(), ContentType::Json);
        assert_eq!(
            "application/x-www-form-urlencoded"
                .parse::<ContentType>()
                .unwrap(),
            ContentType::Form
        );
        assert!("xml".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_request_content_type_serde() {
        let mode: RequestContentType = serde_json::from_str("\"JSON_URL_ENCODED\"").unwrap();
        assert_eq!(mode, RequestContentType::JsonUrlEncoded);
        assert!(mode.is_json());

        let legacy: RequestContentType = serde_json::from_str("\"BINARY-GZ\"").unwrap();
        assert_eq!(legacy, RequestContentType::BinaryGz);
    }
}
