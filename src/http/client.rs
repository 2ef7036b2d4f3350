//! HTTP client with retry
//!
//! Provides the transport used for every API request:
//! - Base URL joining with default headers and query parameters
//! - Authentication and signing on each attempt
//! - Automatic retries on configured status codes, timeouts and connect errors
//! - Redaction of secrets in everything it logs

use super::redact::Redactor;
use super::request::{PreparedRequest, RequestBody};
use crate::auth::Authenticator;
use crate::error::{Error, Result};
use crate::types::{BackoffType, Method};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for all requests
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Status codes that trigger a retry
    pub retry_codes: Vec<u16>,
    /// Default headers for all requests
    pub default_headers: Vec<(String, String)>,
    /// Default query parameters for all requests
    pub default_query: Vec<(String, String)>,
    /// Verify TLS certificates
    pub ssl_verification: bool,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 1,
            initial_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(120),
            backoff_type: BackoffType::Exponential,
            retry_codes: vec![500, 502, 504],
            default_headers: Vec::new(),
            default_query: Vec::new(),
            ssl_verification: true,
            user_agent: format!("generic-http-writer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Exponential backoff of `factor * 2^attempt` seconds
    pub fn backoff_factor(mut self, factor: f64) -> Result<Self> {
        let initial = Duration::try_from_secs_f64(factor).map_err(|e| {
            Error::config(format!("Invalid retry backoff_factor {factor}: {e}"))
        })?;
        self.config.backoff_type = BackoffType::Exponential;
        self.config.initial_backoff = initial;
        Ok(self)
    }

    /// Set the status codes to retry on
    pub fn retry_codes(mut self, codes: Vec<u16>) -> Self {
        self.config.retry_codes = codes;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((key.into(), value.into()));
        self
    }

    /// Add a default query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_query.push((key.into(), value.into()));
        self
    }

    /// Enable or disable TLS certificate verification
    pub fn ssl_verification(mut self, verify: bool) -> Self {
        self.config.ssl_verification = verify;
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters, appended after the defaults
    pub query: Vec<(String, String)>,
    /// Request headers, overriding the defaults
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: RequestBody,
    /// Override timeout for this request
    pub timeout: Option<Duration>,
    /// Override max retries for this request
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Set form body
    #[must_use]
    pub fn form(mut self, pairs: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(pairs);
        self
    }

    /// Set binary body
    #[must_use]
    pub fn binary(mut self, bytes: Vec<u8>) -> Self {
        self.body = RequestBody::Binary(bytes);
        self
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set max retries
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// Status and text of a completed request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP client with retry
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    /// Secrets known outside the authenticator, e.g. `#` user parameters
    secrets: Vec<String>,
    redactor: Redactor,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.ssl_verification)
            .build()?;

        Ok(Self {
            client,
            config,
            authenticator: None,
            secrets: Vec::new(),
            redactor: Redactor::default(),
        })
    }

    /// Create a client with authentication
    ///
    /// The login call goes through this client, so it shares the timeout.
    pub fn with_auth(config: HttpClientConfig, authenticator: Authenticator) -> Result<Self> {
        let mut client = Self::with_config(config)?;
        client.set_authenticator(authenticator);
        Ok(client)
    }

    /// Set the authenticator
    pub fn set_authenticator(&mut self, mut authenticator: Authenticator) {
        authenticator.set_client(self.client.clone());
        self.authenticator = Some(authenticator);
        self.refresh_redactor();
    }

    /// Mask these values in request logs and error messages as well
    pub fn add_secrets(&mut self, secrets: impl IntoIterator<Item = String>) {
        let before = self.secrets.len();
        for secret in secrets {
            if !secret.is_empty() && !self.secrets.contains(&secret) {
                self.secrets.push(secret);
            }
        }
        if self.secrets.len() != before {
            self.refresh_redactor();
        }
    }

    /// Run the authenticator's login and start masking the values it obtained
    pub async fn login(&mut self) -> Result<()> {
        if let Some(auth) = self.authenticator.as_mut() {
            auth.login().await?;
            self.refresh_redactor();
        }
        Ok(())
    }

    fn refresh_redactor(&mut self) {
        let auth_secrets = self
            .authenticator
            .as_ref()
            .map(Authenticator::secrets)
            .unwrap_or_default();
        self.redactor = Redactor::new(auth_secrets.into_iter().chain(self.secrets.iter().cloned()));
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Make a request and return its status and body text
    pub async fn send(&self, method: Method, path: &str, config: &RequestConfig) -> Result<HttpResponse> {
        let response = self.request(method, path, config).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("Response {status}: {}", self.redactor.redact(&body));
        Ok(HttpResponse { status, body })
    }

    /// Make a generic request
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        config: &RequestConfig,
    ) -> Result<Response> {
        let full_url = self.build_url(path);
        let max_retries = config.max_retries.unwrap_or(self.config.max_retries);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        let mut last_error = None;
        let mut attempt = 0;

        while attempt <= max_retries {
            // Authorization and signing see a fresh request on every attempt
            let prepared = self.prepare(method, &full_url, config)?;
            self.log_request(&prepared, attempt);

            match prepared.to_reqwest(&self.client).timeout(timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!("Request succeeded: {} {}", method, self.redactor.redact(&full_url));
                        return Ok(response);
                    }

                    let retryable = self.config.retry_codes.contains(&status.as_u16());
                    if retryable && attempt < max_retries {
                        let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                            extract_retry_after(&response)
                                .unwrap_or_else(|| self.calculate_backoff(attempt))
                        } else {
                            self.calculate_backoff(attempt)
                        };
                        warn!(
                            "Request failed with {}, attempt {}/{}, retrying in {:?}",
                            status.as_u16(),
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(self.status_error(method, &full_url, status, String::new()));
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    let body = if retryable {
                        format!("{body} (retryable status, gave up after {max_retries} retries)")
                    } else {
                        body
                    };
                    return Err(self.status_error(method, &full_url, status, body));
                }
                Err(e) => {
                    if e.is_timeout() {
                        if attempt < max_retries {
                            let delay = self.calculate_backoff(attempt);
                            warn!(
                                "Request timeout, attempt {}/{}, retrying in {:?}",
                                attempt + 1,
                                max_retries + 1,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            last_error = Some(Error::Timeout {
                                timeout_ms: timeout.as_millis() as u64,
                            });
                            continue;
                        }
                        return Err(Error::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }

                    if e.is_connect() && attempt < max_retries {
                        let delay = self.calculate_backoff(attempt);
                        warn!(
                            "Connection error, attempt {}/{}, retrying in {:?}",
                            attempt + 1,
                            max_retries + 1,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        last_error = Some(Error::Http(e));
                        continue;
                    }

                    return Err(Error::Http(e));
                }
            }
        }

        // Exhausted all retries
        Err(last_error.unwrap_or(Error::MaxRetriesExceeded { max_retries }))
    }

    /// Build the request for one attempt: defaults, request values, auth, signature
    fn prepare(&self, method: Method, url: &str, config: &RequestConfig) -> Result<PreparedRequest> {
        let mut req = PreparedRequest::new(method, url)?;

        for (key, value) in self.config.default_query.iter().chain(&config.query) {
            req.append_query(key, value);
        }
        for (key, value) in self.config.default_headers.iter().chain(&config.headers) {
            req.set_header(key, value)?;
        }
        req.body = config.body.clone();

        if let Some(ref auth) = self.authenticator {
            auth.prepare(&mut req)?;
        }
        Ok(req)
    }

    fn log_request(&self, req: &PreparedRequest, attempt: u32) {
        debug!(
            "Request (attempt {}): {} {} headers=[{}] body={}",
            attempt + 1,
            req.method,
            self.redactor.redact(req.url.as_str()),
            self.redactor.redact_headers(&req.headers),
            self.redactor.redact(&req.body.describe())
        );
    }

    fn status_error(&self, method: Method, url: &str, status: StatusCode, body: String) -> Error {
        Error::HttpStatus {
            method: method.to_string(),
            endpoint: self.redactor.redact(url),
            status: status.as_u16(),
            body: self.redactor.redact(&body),
        }
    }

    /// Build full URL from path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => join_url(base, path),
            None => path.to_string(),
        }
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Linear => self.config.initial_backoff * (attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.config.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.config.max_backoff)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("max_retries", &self.config.max_retries)
            .field("has_authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// Join a base URL and an endpoint path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Extract retry-after header value
fn extract_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}
