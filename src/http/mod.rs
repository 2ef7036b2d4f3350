//! HTTP client module
//!
//! Provides the request model used by authentication and signing, and the
//! transport that sends it.
//!
//! # Features
//!
//! - **Automatic Retries**: configurable status codes with backoff
//! - **Authentication**: every attempt is authorized and signed afresh
//! - **Redaction**: secrets are masked in logged requests and responses

mod client;
mod redact;
mod request;

pub use client::{
    join_url, HttpClient, HttpClientConfig, HttpClientConfigBuilder, HttpResponse, RequestConfig,
};
pub use redact::Redactor;
pub use request::{form_pairs, PreparedRequest, RequestBody};
