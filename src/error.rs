//! Error types for the generic HTTP writer
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for the writer
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Some required parameters fields are missing: {message}")]
    Validation { message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Resolution Errors
    // ============================================================================
    #[error("Some user attributes [{}] specified in parameters are not present in \"user_parameters\" field.", .keys.join(", "))]
    UnresolvedReference { keys: Vec<String> },

    #[error("Cyclic reference between user parameters: {}", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("Specified user function [{name}] is not supported! Supported functions are [{}]", .supported.join(", "))]
    UnsupportedFunction {
        name: String,
        supported: Vec<&'static str>,
    },

    #[error("The value of '{key}' is an object but not a valid function object: {value}")]
    InvalidFunction { key: String, value: String },

    #[error("Invalid arguments for function '{function}': {message}")]
    FunctionArgument { function: String, message: String },

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("{name} is not supported auth method, supported values are: [{}]", .supported.join(", "))]
    UnsupportedAuthType {
        name: String,
        supported: Vec<&'static str>,
    },

    #[error("Some arguments of method {method} are missing: [{}]", .missing.join(", "))]
    MissingAuthParameter { method: String, missing: Vec<String> },

    #[error("Login request failed: {message}")]
    Handshake { message: String },

    #[error("Unsupported position '{position}' for API Key auth method, supported values are: [headers, query]")]
    UnsupportedPosition { position: String },

    #[error("Authenticator used before login")]
    NotAuthenticated,

    // ============================================================================
    // Signature Errors
    // ============================================================================
    #[error("{name} is not supported signature method, supported values are: [{}]", .supported.join(", "))]
    UnsupportedSignatureMethod {
        name: String,
        supported: Vec<&'static str>,
    },

    #[error("Request signing failed: {message}")]
    Signature { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request \"{method}: {endpoint}\" failed with status {status}: {body}")]
    HttpStatus {
        method: String,
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header '{name}': {message}")]
    InvalidHeader { name: String, message: String },

    // ============================================================================
    // Data Processing Errors
    // ============================================================================
    #[error("CSV parsing error: {message}")]
    CsvParse { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a handshake error
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Create a function argument error
    pub fn function_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a signature error
    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature {
            message: message.into(),
        }
    }

    /// Create a CSV parse error
    pub fn csv(message: impl Into<String>) -> Self {
        Self::CsvParse {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Whether the error is caused by user configuration or the remote API
    /// rather than by a bug or the environment
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Other(_) | Error::Anyhow(_))
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for the writer
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
