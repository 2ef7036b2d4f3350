//! Request signing
//!
//! A signature method runs after authorization and may add a digest of the
//! request to its body.

use crate::auth::{AuthSpec, MethodParameters, ParameterSpec};
use crate::error::{Error, Result};
use crate::http::{PreparedRequest, RequestBody};
use crate::resolver;
use crate::types::JsonObject;
use md5::{Digest, Md5};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Signature section of the configuration, same shape as the auth section
pub type SignatureSpec = AuthSpec;

const BODY_TOKEN: &str = "$body";
const REQUEST_PARAMETERS_TOKEN: &str = "$request_parameters";

/// Configured signature method
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SignatureMethod {
    #[default]
    NoSignature,
    Hmac(Hmac),
}

impl SignatureMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureMethod::NoSignature => "NoSignature",
            SignatureMethod::Hmac(_) => "HMAC",
        }
    }

    pub fn sign(&self, request: &mut PreparedRequest) -> Result<()> {
        match self {
            SignatureMethod::NoSignature => Ok(()),
            SignatureMethod::Hmac(hmac) => hmac.sign(request),
        }
    }
}

/// Digest of selected request parts, stored in the JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Hmac {
    /// Literal strings, `$body` or `$request_parameters`
    pub concat_values: Vec<String>,
    /// Body key receiving the digest
    pub key: String,
}

impl Hmac {
    pub fn new(concat_values: Vec<String>, key: impl Into<String>) -> Self {
        Self {
            concat_values,
            key: key.into(),
        }
    }

    fn from_parameters(params: &MethodParameters) -> Result<Self> {
        let hash_function = params.string("hash_function").unwrap_or_else(|| "md5".into());
        if hash_function != "md5" {
            return Err(Error::config(format!(
                "Unsupported hash function '{hash_function}' for HMAC signature, supported: [md5]"
            )));
        }
        let location = params.string("location").unwrap_or_else(|| "json_body".into());
        if location != "json_body" {
            return Err(Error::config(format!(
                "Unsupported location '{location}' for HMAC signature, supported: [json_body]"
            )));
        }

        Ok(Self {
            concat_values: params.string_list("concat_values"),
            key: params.string("key").unwrap_or_else(|| "sig".into()),
        })
    }

    /// The text that gets hashed
    pub fn concatenation(&self, request: &PreparedRequest) -> String {
        self.concat_values
            .iter()
            .map(|token| match token.as_str() {
                BODY_TOKEN => match &request.body {
                    RequestBody::Json(body) => body.to_string(),
                    _ => String::new(),
                },
                REQUEST_PARAMETERS_TOKEN => request_parameters(request),
                literal => literal.to_string(),
            })
            .collect()
    }

    fn sign(&self, request: &mut PreparedRequest) -> Result<()> {
        let digest = hex::encode(Md5::digest(self.concatenation(request).as_bytes()));

        match &mut request.body {
            RequestBody::Json(Value::Object(body)) => {
                body.insert(self.key.clone(), Value::String(digest));
                Ok(())
            }
            _ => Err(Error::signature(
                "HMAC signature requires a JSON object body",
            )),
        }
    }
}

/// Query values sorted by key, first value per key, blanks skipped
fn request_parameters(request: &PreparedRequest) -> String {
    let mut params: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in request.query_pairs() {
        params.entry(key).or_insert(value);
    }
    params
        .into_values()
        .filter(|value| !value.trim().is_empty())
        .collect()
}

type Constructor = fn(&MethodParameters) -> Result<SignatureMethod>;

fn build_no_signature(_: &MethodParameters) -> Result<SignatureMethod> {
    Ok(SignatureMethod::NoSignature)
}

fn build_hmac(params: &MethodParameters) -> Result<SignatureMethod> {
    Hmac::from_parameters(params).map(SignatureMethod::Hmac)
}

struct Registration {
    name: &'static str,
    schema: &'static [ParameterSpec],
    build: Constructor,
}

const REGISTRY: &[Registration] = &[
    Registration {
        name: "NoSignature",
        schema: &[],
        build: build_no_signature,
    },
    Registration {
        name: "HMAC",
        schema: &[
            ParameterSpec::required("concat_values"),
            ParameterSpec::optional("key"),
            ParameterSpec::optional("hash_function"),
            ParameterSpec::optional("location"),
        ],
        build: build_hmac,
    },
];

/// Builds signature methods from configuration
pub struct SignMethodBuilder;

impl SignMethodBuilder {
    /// Build a signature method by its registered name
    pub fn build(name: &str, parameters: &JsonObject) -> Result<SignatureMethod> {
        let registration = REGISTRY
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::UnsupportedSignatureMethod {
                name: name.to_string(),
                supported: Self::supported_methods(),
            })?;

        let params = MethodParameters::new(name, parameters);
        params.validate(registration.schema)?;
        let unknown = params.unknown(registration.schema);
        if !unknown.is_empty() {
            warn!("Ignoring unknown parameters of signature {name}: {unknown:?}");
        }
        (registration.build)(&params)
    }

    /// Build from an optional config section, resolving it against user parameters
    pub fn from_spec(
        spec: Option<&SignatureSpec>,
        user_params: &JsonObject,
    ) -> Result<SignatureMethod> {
        match spec {
            None => Ok(SignatureMethod::NoSignature),
            Some(spec) => {
                let parameters = resolver::resolve_object(&spec.parameters, user_params, false)?;
                Self::build(&spec.auth_type, &parameters)
            }
        }
    }

    pub fn supported_methods() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = REGISTRY.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Method;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap_or_default()
    }

    fn md5_hex(s: &str) -> String {
        hex::encode(Md5::digest(s.as_bytes()))
    }

    #[test]
    fn test_request_parameters_sorted_by_key() {
        let hmac = Hmac::new(vec![REQUEST_PARAMETERS_TOKEN.into()], "sig");

        let mut req = PreparedRequest::new(Method::POST, "https://example.com/api?b=2&a=1").unwrap();
        req.body = RequestBody::Json(json!({}));
        assert_eq!(hmac.concatenation(&req), "12");

        hmac.sign(&mut req).unwrap();
        let RequestBody::Json(body) = &req.body else {
            panic!("body must stay JSON")
        };
        assert_eq!(body["sig"], json!(md5_hex("12")));
    }

    #[test]
    fn test_signature_ignores_query_order() {
        let hmac = Hmac::new(
            vec!["salt".into(), REQUEST_PARAMETERS_TOKEN.into(), BODY_TOKEN.into()],
            "sig",
        );

        let mut first =
            PreparedRequest::new(Method::POST, "https://example.com/?x=1&y=2&empty=").unwrap();
        first.body = RequestBody::Json(json!({"id": 7}));
        let mut second =
            PreparedRequest::new(Method::POST, "https://example.com/?empty=&y=2&x=1").unwrap();
        second.body = RequestBody::Json(json!({"id": 7}));

        assert_eq!(hmac.concatenation(&first), "salt12{\"id\":7}");
        hmac.sign(&mut first).unwrap();
        hmac.sign(&mut second).unwrap();
        assert_eq!(first.body, second.body);
    }

    #[test]
    fn test_first_value_wins_for_repeated_keys() {
        let hmac = Hmac::new(vec![REQUEST_PARAMETERS_TOKEN.into()], "sig");
        let req = PreparedRequest::new(Method::GET, "https://example.com/?a=1&a=9&b=2").unwrap();
        assert_eq!(hmac.concatenation(&req), "12");
    }

    #[test]
    fn test_sign_requires_json_object_body() {
        let hmac = Hmac::new(vec!["x".into()], "sig");
        let mut req = PreparedRequest::new(Method::POST, "https://example.com/").unwrap();
        req.body = RequestBody::Json(json!([1, 2]));
        assert!(matches!(
            hmac.sign(&mut req).unwrap_err(),
            Error::Signature { .. }
        ));
    }

    #[test]
    fn test_no_signature_leaves_request_untouched() {
        let mut req = PreparedRequest::new(Method::POST, "https://example.com/?a=1").unwrap();
        req.body = RequestBody::Json(json!({"a": 1}));
        SignatureMethod::NoSignature.sign(&mut req).unwrap();
        assert_eq!(req.body, RequestBody::Json(json!({"a": 1})));
    }

    #[test]
    fn test_builder() {
        let method = SignMethodBuilder::build(
            "HMAC",
            &object(json!({"concat_values": ["a", "$body"], "key": "signature"})),
        )
        .unwrap();
        assert_eq!(
            method,
            SignatureMethod::Hmac(Hmac::new(vec!["a".into(), "$body".into()], "signature"))
        );

        assert!(matches!(
            SignMethodBuilder::build("HMAC", &JsonObject::new()).unwrap_err(),
            Error::MissingAuthParameter { .. }
        ));
        assert!(matches!(
            SignMethodBuilder::build("RSA", &JsonObject::new()).unwrap_err(),
            Error::UnsupportedSignatureMethod { .. }
        ));
        assert!(SignMethodBuilder::build(
            "HMAC",
            &object(json!({"concat_values": ["a"], "hash_function": "sha1"}))
        )
        .is_err());
    }
}
