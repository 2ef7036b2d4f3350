//! Authenticator implementation
//!
//! Wraps a strategy and a signature method, and tracks whether the login
//! handshake has run.

use super::strategies::AuthMethod;
use crate::error::{Error, Result};
use crate::http::PreparedRequest;
use crate::signature::SignatureMethod;
use reqwest::Client;
use tracing::{debug, info};

/// Authenticator applies authentication and signatures to HTTP requests
#[derive(Debug)]
pub struct Authenticator {
    /// Configured strategy
    method: AuthMethod,
    /// Signing step run after authorization
    signature: SignatureMethod,
    /// HTTP client for the login call
    http_client: Client,
    authenticated: bool,
}

impl Authenticator {
    /// Create a new authenticator for the given strategy
    pub fn new(method: AuthMethod) -> Self {
        Self::with_client(method, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(method: AuthMethod, http_client: Client) -> Self {
        Self {
            method,
            signature: SignatureMethod::NoSignature,
            http_client,
            authenticated: false,
        }
    }

    /// Attach a signature method
    pub fn with_signature(mut self, signature: SignatureMethod) -> Self {
        self.signature = signature;
        self
    }

    /// Use another client for the login call, e.g. one sharing the transport timeout
    pub fn set_client(&mut self, http_client: Client) {
        self.http_client = http_client;
    }

    /// Run the login handshake
    ///
    /// Strategies without a handshake complete immediately. Calling this on an
    /// authenticated instance does nothing.
    pub async fn login(&mut self) -> Result<()> {
        if self.authenticated {
            debug!("Already authenticated with {}", self.method.name());
            return Ok(());
        }
        self.method.login(&self.http_client).await?;
        self.authenticated = true;
        info!("Authenticated using {}", self.method.name());
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Apply credentials to a request
    pub fn authorize(&self, request: &mut PreparedRequest) -> Result<()> {
        if !self.authenticated {
            return Err(Error::NotAuthenticated);
        }
        self.method.authorize(request)
    }

    /// Sign a request, after it was authorized
    pub fn sign(&self, request: &mut PreparedRequest) -> Result<()> {
        self.signature.sign(request)
    }

    /// Authorize then sign
    pub fn prepare(&self, request: &mut PreparedRequest) -> Result<()> {
        self.authorize(request)?;
        self.sign(request)
    }

    /// Every secret value that may end up in a request, for log redaction
    pub fn secrets(&self) -> Vec<String> {
        self.method
            .secrets()
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn method(&self) -> &AuthMethod {
        &self.method
    }

    pub fn signature(&self) -> &SignatureMethod {
        &self.signature
    }
}
