//! Authentication strategies
//!
//! Each strategy holds its resolved fields. Secret values are kept as
//! [`SecretString`] and only exposed when written into a request.

use super::types::{ClientAuthType, Location, MethodParameters};
use crate::error::{Error, Result};
use crate::http::{form_pairs, PreparedRequest};
use crate::resolver::{self, string_form, Placeholder};
use crate::types::{ContentType, JsonObject, Method};
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

fn basic_credential(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"))
}

/// Configured authentication strategy
#[derive(Debug)]
pub enum AuthMethod {
    NoAuthentication,
    BasicHttp(BasicHttp),
    BearerToken(BearerToken),
    ApiKey(ApiKey),
    Login(Login),
    OAuth20ClientCredentials(OAuth20ClientCredentials),
}

impl AuthMethod {
    /// Registered name of the strategy
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::NoAuthentication => "NoAuthentication",
            AuthMethod::BasicHttp(_) => "BasicHttp",
            AuthMethod::BearerToken(_) => "BearerToken",
            AuthMethod::ApiKey(_) => "ApiKey",
            AuthMethod::Login(_) => "Login",
            AuthMethod::OAuth20ClientCredentials(_) => "OAuth20ClientCredentials",
        }
    }

    /// Run the handshake, if the strategy has one
    pub async fn login(&mut self, client: &Client) -> Result<()> {
        match self {
            AuthMethod::Login(login) => login.login(client).await,
            AuthMethod::OAuth20ClientCredentials(oauth) => oauth.login.login(client).await,
            _ => Ok(()),
        }
    }

    /// Apply credentials to an outgoing request
    pub fn authorize(&self, request: &mut PreparedRequest) -> Result<()> {
        match self {
            AuthMethod::NoAuthentication => Ok(()),
            AuthMethod::BasicHttp(basic) => basic.authorize(request),
            AuthMethod::BearerToken(bearer) => bearer.authorize(request),
            AuthMethod::ApiKey(api_key) => api_key.authorize(request),
            AuthMethod::Login(login) => login.authorize(request),
            AuthMethod::OAuth20ClientCredentials(oauth) => oauth.login.authorize(request),
        }
    }

    /// Every secret value this strategy writes into requests
    pub fn secrets(&self) -> Vec<String> {
        match self {
            AuthMethod::NoAuthentication => Vec::new(),
            AuthMethod::BasicHttp(basic) => basic.secrets(),
            AuthMethod::BearerToken(bearer) => vec![bearer.token.expose_secret().to_string()],
            AuthMethod::ApiKey(api_key) => vec![api_key.token.expose_secret().to_string()],
            AuthMethod::Login(login) => login.secrets(),
            AuthMethod::OAuth20ClientCredentials(oauth) => oauth.secrets(),
        }
    }
}

/// HTTP Basic authentication
#[derive(Debug)]
pub struct BasicHttp {
    pub username: String,
    password: SecretString,
}

impl BasicHttp {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub(crate) fn from_parameters(params: &MethodParameters) -> Result<Self> {
        Ok(Self {
            username: params.required_string("username")?,
            password: params.secret("password")?,
        })
    }

    fn credential(&self) -> String {
        basic_credential(&self.username, self.password.expose_secret())
    }

    fn authorize(&self, request: &mut PreparedRequest) -> Result<()> {
        request.set_header("Authorization", &format!("Basic {}", self.credential()))
    }

    fn secrets(&self) -> Vec<String> {
        vec![self.password.expose_secret().to_string(), self.credential()]
    }
}

impl PartialEq for BasicHttp {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

/// Static bearer token
#[derive(Debug)]
pub struct BearerToken {
    token: SecretString,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }

    pub(crate) fn from_parameters(params: &MethodParameters) -> Result<Self> {
        Ok(Self {
            token: params.secret("token")?,
        })
    }

    fn authorize(&self, request: &mut PreparedRequest) -> Result<()> {
        request.set_header(
            "Authorization",
            &format!("Bearer {}", self.token.expose_secret()),
        )
    }
}

impl PartialEq for BearerToken {
    fn eq(&self, other: &Self) -> bool {
        self.token.expose_secret() == other.token.expose_secret()
    }
}

/// API key sent in a header or the query string
#[derive(Debug)]
pub struct ApiKey {
    pub key: String,
    token: SecretString,
    pub position: Location,
}

impl ApiKey {
    pub fn new(key: impl Into<String>, token: impl Into<String>, position: Location) -> Self {
        Self {
            key: key.into(),
            token: SecretString::from(token.into()),
            position,
        }
    }

    pub(crate) fn from_parameters(params: &MethodParameters) -> Result<Self> {
        Ok(Self {
            key: params.required_string("key")?,
            token: params.secret("token")?,
            position: params.required_string("position")?.parse()?,
        })
    }

    fn authorize(&self, request: &mut PreparedRequest) -> Result<()> {
        match self.position {
            Location::Headers => request.set_header(&self.key, self.token.expose_secret()),
            Location::Query => {
                request.append_query(&self.key, self.token.expose_secret());
                Ok(())
            }
        }
    }
}

impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.position == other.position
            && self.token.expose_secret() == other.token.expose_secret()
    }
}

/// The single call made by [`Login::login`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub endpoint: String,
    pub method: Method,
    pub query_parameters: JsonObject,
    pub body: Option<Value>,
    pub content_type: ContentType,
    pub headers: JsonObject,
}

impl LoginRequest {
    async fn send(&self, client: &Client) -> Result<Value> {
        let url = Url::parse(&self.endpoint)?;
        let mut req = client.request(self.method.into(), url);

        let query = form_pairs(&self.query_parameters);
        if !query.is_empty() {
            req = req.query(&query);
        }
        for (name, value) in &self.headers {
            req = req.header(name.as_str(), string_form(value));
        }
        if let Some(body) = &self.body {
            req = match (self.content_type, body) {
                (ContentType::Json, body) => req.json(body),
                (ContentType::Form, Value::Object(map)) => req.form(&form_pairs(map)),
                (ContentType::Form, other) => req.body(string_form(other)),
            };
        }

        info!("Logging in: {} {}", self.method, self.endpoint);
        let response = req.send().await.map_err(|e| {
            Error::handshake(format!(
                "Login request to {} failed: {}",
                self.endpoint,
                e.without_url()
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::handshake(format!(
                "Login request to {} failed with status {}: {body}",
                self.endpoint,
                status.as_u16()
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            Error::handshake(format!(
                "Login response from {} is not valid JSON: {e}",
                self.endpoint
            ))
        })
    }
}

/// Values obtained from the login response
#[derive(Debug, Default)]
struct Injected {
    headers: Vec<(String, SecretString)>,
    query: Vec<(String, SecretString)>,
}

#[derive(Debug, Default)]
enum LoginState {
    #[default]
    Unauthenticated,
    Authenticated(Injected),
}

/// Two phase authentication: call a login endpoint, then inject values
/// taken from its response into every API request
#[derive(Debug)]
pub struct Login {
    pub request: LoginRequest,
    pub api_request_headers: JsonObject,
    pub api_request_query_parameters: JsonObject,
    state: LoginState,
}

impl Login {
    pub fn new(
        request: LoginRequest,
        api_request_headers: JsonObject,
        api_request_query_parameters: JsonObject,
    ) -> Self {
        Self {
            request,
            api_request_headers,
            api_request_query_parameters,
            state: LoginState::Unauthenticated,
        }
    }

    pub(crate) fn from_parameters(params: &MethodParameters, default_method: Method) -> Result<Self> {
        let method = match params.string("method") {
            Some(method) => method.parse()?,
            None => default_method,
        };
        let content_type = match params.string("login_content_type") {
            Some(content_type) => content_type.parse()?,
            None => ContentType::default(),
        };

        // functions directly under the login maps are evaluated up front
        let no_params = JsonObject::new();
        let body = match params.value("login_query_body") {
            Some(Value::Object(map)) => Some(Value::Object(resolver::resolve_object(
                map, &no_params, true,
            )?)),
            Some(other) => Some(other.clone()),
            None => None,
        };

        let request = LoginRequest {
            endpoint: params.required_string("login_endpoint")?,
            method,
            query_parameters: resolver::resolve_object(
                &params.object("login_query_parameters")?,
                &no_params,
                true,
            )?,
            body,
            content_type,
            headers: resolver::resolve_object(&params.object("login_headers")?, &no_params, true)?,
        };

        Ok(Self::new(
            request,
            params.object("api_request_headers")?,
            params.object("api_request_query_parameters")?,
        ))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, LoginState::Authenticated(_))
    }

    /// Perform the login call and resolve the values to inject
    pub async fn login(&mut self, client: &Client) -> Result<()> {
        let response = self.request.send(client).await?;

        let injected = Injected {
            headers: inject_response(&response, &self.api_request_headers)?,
            query: inject_response(&response, &self.api_request_query_parameters)?,
        };
        debug!(
            "Login succeeded, injecting {} header(s) and {} query parameter(s)",
            injected.headers.len(),
            injected.query.len()
        );
        self.state = LoginState::Authenticated(injected);
        Ok(())
    }

    fn authorize(&self, request: &mut PreparedRequest) -> Result<()> {
        let LoginState::Authenticated(injected) = &self.state else {
            return Err(Error::NotAuthenticated);
        };
        for (key, value) in &injected.query {
            request.append_query(key, value.expose_secret());
        }
        for (name, value) in &injected.headers {
            request.set_header(name, value.expose_secret())?;
        }
        Ok(())
    }

    fn secrets(&self) -> Vec<String> {
        match &self.state {
            LoginState::Unauthenticated => Vec::new(),
            LoginState::Authenticated(injected) => injected
                .headers
                .iter()
                .chain(&injected.query)
                .map(|(_, value)| value.expose_secret().to_string())
                .collect(),
        }
    }
}

/// Replace response placeholders with values from the login response, then
/// evaluate functions and convert to strings
fn inject_response(response: &Value, template: &JsonObject) -> Result<Vec<(String, SecretString)>> {
    for path in resolver::response_paths(&Value::Object(template.clone())) {
        if lookup_path(response, &path).is_none() {
            warn!("Login response has no value at '{path}', using an empty string");
        }
    }
    let substituted: JsonObject = template
        .iter()
        .map(|(key, value)| (key.clone(), substitute_response(value, response)))
        .collect();

    let resolved = resolver::resolve_object(&substituted, &JsonObject::new(), true)?;
    Ok(resolved
        .into_iter()
        .map(|(key, value)| (key, SecretString::from(string_form(&value))))
        .collect())
}

fn substitute_response(node: &Value, response: &Value) -> Value {
    if let Placeholder::Response(path) = Placeholder::parse(node) {
        let found = lookup_path(response, path).unwrap_or(&Value::Null);
        return Value::String(string_form(found));
    }
    match node {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_response(v, response)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_response(v, response))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Look up a dotted path such as `data.token` or `$.items.0.id`
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// OAuth 2.0 client credentials grant, a login whose request is derived
/// from the client credentials
#[derive(Debug)]
pub struct OAuth20ClientCredentials {
    pub login: Login,
    pub client_id: String,
    client_secret: SecretString,
    pub auth_type: ClientAuthType,
    pub scopes: Vec<String>,
}

impl OAuth20ClientCredentials {
    pub(crate) fn from_parameters(params: &MethodParameters) -> Result<Self> {
        let mut login = Login::from_parameters(params, Method::POST)?;
        let client_id = params.required_string("client_id")?;
        let client_secret = params.secret("client_secret")?;
        let auth_type = match params.string("auth_type") {
            Some(auth_type) => auth_type.parse()?,
            None => ClientAuthType::default(),
        };
        let scopes = params.string_list("scopes");

        let mut grant = JsonObject::new();
        grant.insert("grant_type".into(), "client_credentials".into());
        if !scopes.is_empty() {
            grant.insert("scope".into(), scopes.join(" ").into());
        }
        let mut with_credentials = grant.clone();
        with_credentials.insert("client_id".into(), client_id.clone().into());
        with_credentials.insert(
            "client_secret".into(),
            client_secret.expose_secret().to_string().into(),
        );

        let request = &mut login.request;
        match auth_type {
            ClientAuthType::ClientSecretBasic => {
                let credential = basic_credential(&client_id, client_secret.expose_secret());
                request
                    .headers
                    .insert("Authorization".into(), format!("Basic {credential}").into());
                request.content_type = ContentType::Form;
                merge_into_body(request, grant);
            }
            // credentials travel in the token URL's query string
            ClientAuthType::ClientSecretPostForm => {
                request.query_parameters.extend(with_credentials);
                request.headers.insert(
                    "Content-Type".into(),
                    "application/x-www-form-urlencoded".into(),
                );
                request.content_type = ContentType::Form;
            }
            ClientAuthType::ClientSecretPostJson => {
                request.content_type = ContentType::Json;
                merge_into_body(request, with_credentials);
            }
            ClientAuthType::ClientSecretPost => {
                // follows an explicit login content type, form otherwise
                if params.value("login_content_type").is_none() {
                    request.content_type = ContentType::Form;
                }
                merge_into_body(request, with_credentials);
            }
        }

        Ok(Self {
            login,
            client_id,
            client_secret,
            auth_type,
            scopes,
        })
    }

    fn secrets(&self) -> Vec<String> {
        let mut secrets = self.login.secrets();
        secrets.push(self.client_secret.expose_secret().to_string());
        secrets.push(basic_credential(
            &self.client_id,
            self.client_secret.expose_secret(),
        ));
        secrets
    }
}

/// Add token request fields to the configured login body
fn merge_into_body(request: &mut LoginRequest, fields: JsonObject) {
    let mut body = match request.body.take() {
        Some(Value::Object(map)) => map,
        _ => JsonObject::new(),
    };
    body.extend(fields);
    request.body = Some(Value::Object(body));
}
