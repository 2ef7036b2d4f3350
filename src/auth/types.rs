//! Auth configuration types
//!
//! Parameters arrive as a flat JSON object. Keys starting with `#` are
//! secret; they are moved into a separate table of [`SecretString`] values
//! keyed by the bare name.

use crate::error::{Error, Result};
use crate::resolver::string_form;
use crate::types::JsonObject;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Prefix marking a secret parameter
pub const SECRET_PREFIX: char = '#';

/// Authentication section of the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSpec {
    /// Registered method name, e.g. `BasicHttp`
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default)]
    pub parameters: JsonObject,
}

/// Where an API key is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    #[default]
    Headers,
    Query,
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "headers" => Ok(Location::Headers),
            "query" => Ok(Location::Query),
            other => Err(Error::UnsupportedPosition {
                position: other.to_string(),
            }),
        }
    }
}

/// How the OAuth client authenticates against the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuthType {
    /// Basic header, form body
    #[default]
    ClientSecretBasic,
    /// Credentials in the body, encoding taken from the login content type
    ClientSecretPost,
    /// Credentials in a JSON body
    ClientSecretPostJson,
    /// Credentials in a form body
    ClientSecretPostForm,
}

impl FromStr for ClientAuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client_secret_basic" => Ok(ClientAuthType::ClientSecretBasic),
            "client_secret_post" => Ok(ClientAuthType::ClientSecretPost),
            "client_secret_post_json" => Ok(ClientAuthType::ClientSecretPostJson),
            "client_secret_post_form" => Ok(ClientAuthType::ClientSecretPostForm),
            other => Err(Error::config(format!(
                "Unsupported OAuth client auth type '{other}', expected one of \
                 client_secret_basic, client_secret_post, client_secret_post_json, \
                 client_secret_post_form"
            ))),
        }
    }
}

/// One entry of a method's parameter schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub required: bool,
    /// Must be supplied with the `#` prefix
    pub secret: bool,
}

impl ParameterSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            secret: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            secret: false,
        }
    }

    pub const fn secret(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            secret: true,
        }
    }

    /// Name as it appears in configuration
    pub fn display_name(&self) -> String {
        if self.secret {
            format!("{SECRET_PREFIX}{}", self.name)
        } else {
            self.name.to_string()
        }
    }
}

/// Parameters of an auth or signature method, split into public and secret
pub struct MethodParameters {
    method: String,
    public: JsonObject,
    secrets: HashMap<String, SecretString>,
}

impl std::fmt::Debug for MethodParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut secret_names: Vec<&String> = self.secrets.keys().collect();
        secret_names.sort();
        f.debug_struct("MethodParameters")
            .field("method", &self.method)
            .field("public", &self.public)
            .field("secrets", &secret_names)
            .finish()
    }
}

impl MethodParameters {
    /// Split raw parameters on the secret prefix
    pub fn new(method: &str, raw: &JsonObject) -> Self {
        let mut public = JsonObject::new();
        let mut secrets = HashMap::new();
        for (key, value) in raw {
            match key.strip_prefix(SECRET_PREFIX) {
                Some(name) => {
                    secrets.insert(name.to_string(), SecretString::from(string_form(value)));
                }
                None => {
                    public.insert(key.clone(), value.clone());
                }
            }
        }
        Self {
            method: method.to_string(),
            public,
            secrets,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Check the parameters against a schema, reporting every missing field
    pub fn validate(&self, schema: &[ParameterSpec]) -> Result<()> {
        let missing: Vec<String> = schema
            .iter()
            .filter(|spec| spec.required && !self.contains(spec))
            .map(ParameterSpec::display_name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingAuthParameter {
                method: self.method.clone(),
                missing,
            })
        }
    }

    /// Parameter names not declared by the schema
    pub fn unknown(&self, schema: &[ParameterSpec]) -> Vec<String> {
        let known = |name: &str, secret: bool| {
            schema
                .iter()
                .any(|spec| spec.name == name && spec.secret == secret)
        };
        let mut unknown: Vec<String> = self
            .public
            .keys()
            .filter(|k| !known(k.as_str(), false))
            .cloned()
            .chain(
                self.secrets
                    .keys()
                    .filter(|k| !known(k.as_str(), true))
                    .map(|k| format!("{SECRET_PREFIX}{k}")),
            )
            .collect();
        unknown.sort();
        unknown
    }

    fn contains(&self, spec: &ParameterSpec) -> bool {
        if spec.secret {
            self.secrets.contains_key(spec.name)
        } else {
            self.public.get(spec.name).is_some_and(|v| !v.is_null())
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.public.get(name).filter(|v| !v.is_null())
    }

    /// Public parameter in string form
    pub fn string(&self, name: &str) -> Option<String> {
        self.value(name).map(string_form)
    }

    pub fn required_string(&self, name: &str) -> Result<String> {
        self.string(name).ok_or_else(|| Error::MissingAuthParameter {
            method: self.method.clone(),
            missing: vec![name.to_string()],
        })
    }

    /// Public object parameter, empty when absent
    pub fn object(&self, name: &str) -> Result<JsonObject> {
        match self.value(name) {
            None => Ok(JsonObject::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            // the platform encodes an empty object as an empty list
            Some(Value::Array(items)) if items.is_empty() => Ok(JsonObject::new()),
            Some(other) => Err(Error::config(format!(
                "Parameter '{name}' of method {} must be an object, got {other}",
                self.method
            ))),
        }
    }

    /// List parameter; a single string is split on whitespace or commas
    pub fn string_list(&self, name: &str) -> Vec<String> {
        match self.value(name) {
            Some(Value::Array(items)) => items.iter().map(string_form).collect(),
            Some(Value::String(s)) => s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            Some(other) => vec![string_form(other)],
            None => Vec::new(),
        }
    }

    pub fn secret(&self, name: &str) -> Result<SecretString> {
        self.secrets
            .get(name)
            .map(|s| SecretString::from(s.expose_secret().to_string()))
            .ok_or_else(|| Error::MissingAuthParameter {
                method: self.method.clone(),
                missing: vec![format!("{SECRET_PREFIX}{name}")],
            })
    }
}
