//! Auth method registry
//!
//! Maps a configured type name to a parameter schema and a constructor.

use super::authenticator::Authenticator;
use super::strategies::{ApiKey, AuthMethod, BasicHttp, BearerToken, Login, OAuth20ClientCredentials};
use super::types::{AuthSpec, MethodParameters, ParameterSpec};
use crate::error::{Error, Result};
use crate::resolver;
use crate::types::{JsonObject, Method};
use serde_json::Value;
use tracing::{debug, warn};

type Constructor = fn(&MethodParameters) -> Result<AuthMethod>;

struct Registration {
    name: &'static str,
    schema: &'static [ParameterSpec],
    build: Constructor,
    /// Accepts the nested `loginRequest`/`apiRequest` form
    login_request: bool,
}

const LOGIN_PARAMETERS: [ParameterSpec; 8] = [
    ParameterSpec::required("login_endpoint"),
    ParameterSpec::optional("method"),
    ParameterSpec::optional("login_query_parameters"),
    ParameterSpec::optional("login_query_body"),
    ParameterSpec::optional("login_content_type"),
    ParameterSpec::optional("login_headers"),
    ParameterSpec::optional("api_request_headers"),
    ParameterSpec::optional("api_request_query_parameters"),
];

const OAUTH_PARAMETERS: [ParameterSpec; 12] = [
    ParameterSpec::required("client_id"),
    ParameterSpec::secret("client_secret"),
    ParameterSpec::optional("auth_type"),
    ParameterSpec::optional("scopes"),
    LOGIN_PARAMETERS[0],
    LOGIN_PARAMETERS[1],
    LOGIN_PARAMETERS[2],
    LOGIN_PARAMETERS[3],
    LOGIN_PARAMETERS[4],
    LOGIN_PARAMETERS[5],
    LOGIN_PARAMETERS[6],
    LOGIN_PARAMETERS[7],
];

const REGISTRY: &[Registration] = &[
    Registration {
        name: "NoAuthentication",
        schema: &[],
        build: build_no_authentication,
        login_request: false,
    },
    Registration {
        name: "BasicHttp",
        schema: &[
            ParameterSpec::required("username"),
            ParameterSpec::secret("password"),
        ],
        build: build_basic_http,
        login_request: false,
    },
    Registration {
        name: "BearerToken",
        schema: &[ParameterSpec::secret("token")],
        build: build_bearer_token,
        login_request: false,
    },
    Registration {
        name: "ApiKey",
        schema: &[
            ParameterSpec::required("key"),
            ParameterSpec::secret("token"),
            ParameterSpec::required("position"),
        ],
        build: build_api_key,
        login_request: false,
    },
    Registration {
        name: "Login",
        schema: &LOGIN_PARAMETERS,
        build: build_login,
        login_request: true,
    },
    Registration {
        name: "OAuth20ClientCredentials",
        schema: &OAUTH_PARAMETERS,
        build: build_oauth,
        login_request: true,
    },
];

fn build_no_authentication(_: &MethodParameters) -> Result<AuthMethod> {
    Ok(AuthMethod::NoAuthentication)
}

fn build_basic_http(params: &MethodParameters) -> Result<AuthMethod> {
    BasicHttp::from_parameters(params).map(AuthMethod::BasicHttp)
}

fn build_bearer_token(params: &MethodParameters) -> Result<AuthMethod> {
    BearerToken::from_parameters(params).map(AuthMethod::BearerToken)
}

fn build_api_key(params: &MethodParameters) -> Result<AuthMethod> {
    ApiKey::from_parameters(params).map(AuthMethod::ApiKey)
}

fn build_login(params: &MethodParameters) -> Result<AuthMethod> {
    Login::from_parameters(params, Method::GET).map(AuthMethod::Login)
}

fn build_oauth(params: &MethodParameters) -> Result<AuthMethod> {
    OAuth20ClientCredentials::from_parameters(params).map(AuthMethod::OAuth20ClientCredentials)
}

/// Builds authenticators from configuration
pub struct AuthMethodBuilder;

impl AuthMethodBuilder {
    /// Build an authenticator by its registered type name
    ///
    /// Parameters must already be resolved. Secret fields are expected with
    /// the `#` prefix.
    pub fn build(auth_type: &str, parameters: &JsonObject) -> Result<Authenticator> {
        Self::build_method(auth_type, parameters).map(Authenticator::new)
    }

    /// Build only the strategy, without the authenticator wrapper
    pub fn build_method(auth_type: &str, parameters: &JsonObject) -> Result<AuthMethod> {
        let registration = REGISTRY
            .iter()
            .find(|r| r.name == auth_type)
            .ok_or_else(|| Error::UnsupportedAuthType {
                name: auth_type.to_string(),
                supported: Self::supported_methods(),
            })?;

        let params = if registration.login_request {
            MethodParameters::new(auth_type, &flatten_login_parameters(parameters))
        } else {
            MethodParameters::new(auth_type, parameters)
        };
        params.validate(registration.schema)?;

        let unknown = params.unknown(registration.schema);
        if !unknown.is_empty() {
            warn!("Ignoring unknown parameters of auth method {auth_type}: {unknown:?}");
        }

        debug!("Building auth method {auth_type}");
        (registration.build)(&params)
    }

    /// Build from an optional config section, resolving its parameters
    /// against the user parameters first
    pub fn from_spec(spec: Option<&AuthSpec>, user_params: &JsonObject) -> Result<Authenticator> {
        match spec {
            None => Ok(Authenticator::new(AuthMethod::NoAuthentication)),
            Some(spec) => {
                let parameters = resolver::resolve_object(&spec.parameters, user_params, false)?;
                Self::build(&spec.auth_type, &parameters)
            }
        }
    }

    /// Names of all registered methods, sorted
    pub fn supported_methods() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = REGISTRY.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names
    }
}

/// Move `loginRequest` and `apiRequest` fields to their flat names
///
/// Flat names already present take precedence.
pub(crate) fn flatten_login_parameters(parameters: &JsonObject) -> JsonObject {
    let mut flat = parameters.clone();
    let login_request = flat.remove("loginRequest");
    let api_request = flat.remove("apiRequest");

    let mut lift = |source: &Option<Value>, from: &[&str], to: &str| {
        let Some(Value::Object(source)) = source else {
            return;
        };
        if flat.contains_key(to) {
            return;
        }
        if let Some(value) = from.iter().find_map(|key| source.get(*key)) {
            flat.insert(to.to_string(), value.clone());
        }
    };

    lift(&login_request, &["endpoint"], "login_endpoint");
    lift(&login_request, &["method"], "method");
    lift(&login_request, &["query_parameters", "params"], "login_query_parameters");
    lift(&login_request, &["body"], "login_query_body");
    lift(&login_request, &["content_type"], "login_content_type");
    lift(&login_request, &["headers"], "login_headers");
    lift(&api_request, &["headers"], "api_request_headers");
    lift(&api_request, &["query_parameters", "params"], "api_request_query_parameters");

    flat
}
