//! Outgoing request representation
//!
//! Authentication and signing operate on a [`PreparedRequest`] before it is
//! turned into a `reqwest` request. Keeping our own type lets those hooks run
//! synchronously and be inspected in tests.

use crate::error::{Error, Result};
use crate::resolver::string_form;
use crate::types::{JsonObject, Method};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use url::Url;

/// Request payload
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON document
    Json(Value),
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
    /// Raw bytes
    Binary(Vec<u8>),
}

impl RequestBody {
    /// Content type implied by the body
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
            RequestBody::Binary(_) => Some("application/octet-stream"),
        }
    }

    /// Short description used in logs
    pub fn describe(&self) -> String {
        match self {
            RequestBody::Empty => String::new(),
            RequestBody::Json(value) => value.to_string(),
            RequestBody::Form(pairs) => pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            RequestBody::Binary(bytes) => format!("<{} bytes>", bytes.len()),
        }
    }
}

/// A request ready to be authorized, signed and sent
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl PreparedRequest {
    /// Create a request without headers or body
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self {
            method,
            url: Url::parse(url)?,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        })
    }

    /// Set a header, replacing any previous value
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Get a header value as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Append a query parameter to the URL
    pub fn append_query(&mut self, key: &str, value: &str) {
        self.url.query_pairs_mut().append_pair(key, value);
    }

    /// Decoded query parameters in URL order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Effective content type: an explicit header wins over the body's
    pub fn content_type(&self) -> Option<String> {
        self.header(CONTENT_TYPE.as_str())
            .map(str::to_string)
            .or_else(|| self.body.content_type().map(str::to_string))
    }

    /// Convert to a `reqwest` request builder
    pub fn to_reqwest(&self, client: &Client) -> RequestBuilder {
        let mut req = client
            .request(self.method.into(), self.url.clone())
            .headers(self.headers.clone());

        req = match &self.body {
            RequestBody::Empty => req,
            RequestBody::Json(value) => req.json(value),
            RequestBody::Form(pairs) => req.form(pairs),
            RequestBody::Binary(bytes) if self.headers.contains_key(CONTENT_TYPE) => {
                req.body(bytes.clone())
            }
            RequestBody::Binary(bytes) => req
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };
        req
    }
}

/// Flatten a JSON object into form pairs using the string form of each value
pub fn form_pairs(map: &JsonObject) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| (k.clone(), string_form(v)))
        .collect()
}
