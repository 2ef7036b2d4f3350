//! # Generic HTTP Writer
//!
//! Sends a CSV table to an arbitrary HTTP API, driven entirely by configuration.
//!
//! ## Features
//!
//! - **Parameter Resolution**: `{"attr": ..}` references, user functions and time macros
//! - **Auth Negotiation**: Basic, Bearer, API key, login handshakes and OAuth 2.0 client credentials
//! - **Request Signing**: HMAC digests over the body or the query parameters
//! - **Payload Modes**: JSON chunks, form-encoded rows, raw or gzipped files, empty requests
//! - **Retries and Redaction**: configurable retry codes with backoff, secrets masked in logs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use generic_http_writer::{auth::AuthMethodBuilder, http::{HttpClient, HttpClientConfig, RequestConfig}};
//! use generic_http_writer::{Method, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let params = serde_json::json!({"#token": "secret"});
//!     let auth = AuthMethodBuilder::build("BearerToken", params.as_object().unwrap())?;
//!
//!     let config = HttpClientConfig::builder().base_url("https://api.example.com").build();
//!     let mut client = HttpClient::with_auth(config, auth)?;
//!     client.login().await?;
//!
//!     let body = serde_json::json!({"name": "Ann"});
//!     client.send(Method::POST, "/users", &RequestConfig::new().json(body)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Runner                                 │
//! │  config.json → WriterConfiguration    in/tables/*.csv → rows    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────┬───────────┬───────┴───────┬───────────┬─────────────┐
//! │ Resolver │   Auth    │   Signature   │  Convert  │    HTTP     │
//! ├──────────┼───────────┼───────────────┼───────────┼─────────────┤
//! │ attr     │ Basic     │ HMAC          │ CSV       │ Retry       │
//! │ function │ Bearer    │               │ Nesting   │ Backoff     │
//! │ time     │ ApiKey    │               │ Typing    │ Redaction   │
//! │          │ Login     │               │ Chunks    │             │
//! │          │ OAuth 2.0 │               │           │             │
//! └──────────┴───────────┴───────────────┴───────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the writer
pub mod error;

/// Common types and type aliases
pub mod types;

/// Parameter resolution and user functions
pub mod resolver;

/// Authentication strategies and the authenticator
pub mod auth;

/// Request signing
pub mod signature;

/// HTTP client with retry and redaction
pub mod http;

/// Writer configuration
pub mod config;

/// CSV to JSON conversion
pub mod convert;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::{build_configuration, WriterConfiguration};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
