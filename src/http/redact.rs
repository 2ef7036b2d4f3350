//! Masking of secrets in logged requests and responses

use regex::Regex;
use reqwest::header::HeaderMap;
use std::sync::LazyLock;

const MASK: &str = "****";

/// `Bearer <token>`
static BEARER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)(bearer\s+)[^\s"',;&]+"#).unwrap());

/// Credential-like fields in query strings, form bodies and JSON
static CREDENTIAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(password|api_key|access_token|client_secret|authorization_code|refresh_token|oauth_secret)("?\s*[=:]\s*"?)[^&\s"',;}]+"#,
    )
    .unwrap()
});

/// Replaces known secret values and common credential patterns with `****`
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    /// Longest first, so a secret containing another is masked whole
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new(secrets: impl IntoIterator<Item = String>) -> Self {
        let mut secrets: Vec<String> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        let out = BEARER_REGEX.replace_all(&out, format!("${{1}}{MASK}"));
        CREDENTIAL_REGEX
            .replace_all(&out, format!("${{1}}${{2}}{MASK}"))
            .into_owned()
    }

    /// Render headers as `name: value` pairs with values redacted
    pub fn redact_headers(&self, headers: &HeaderMap) -> String {
        headers
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("<binary>");
                format!("{name}: {}", self.redact(value))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_masks_known_secrets() {
        let redactor = Redactor::new(vec!["s3cret".to_string(), "s3cret-longer".to_string()]);
        assert_eq!(
            redactor.redact("a=s3cret-longer&b=s3cret"),
            "a=****&b=****"
        );
    }

    #[test]
    fn test_masks_credential_patterns() {
        let redactor = Redactor::default();
        assert_eq!(
            redactor.redact("Authorization: Bearer abc.def"),
            "Authorization: Bearer ****"
        );
        assert_eq!(
            redactor.redact("https://api.test/x?api_key=123&page=2"),
            "https://api.test/x?api_key=****&page=2"
        );
        assert_eq!(
            redactor.redact(r#"{"client_secret": "xyz", "id": 1}"#),
            r#"{"client_secret": "****", "id": 1}"#
        );
        assert_eq!(
            redactor.redact("password=hunter2"),
            "password=****"
        );
    }

    #[test]
    fn test_plain_text_unchanged() {
        let redactor = Redactor::new(Vec::new());
        assert_eq!(redactor.redact("nothing to hide"), "nothing to hide");
    }

    #[test]
    fn test_redact_headers() {
        let redactor = Redactor::new(vec!["k3y".to_string()]);
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k3y"));
        headers.insert("accept", HeaderValue::from_static("application/json"));
        let rendered = redactor.redact_headers(&headers);
        assert!(rendered.contains("x-api-key: ****"));
        assert!(rendered.contains("accept: application/json"));
        assert!(!rendered.contains("k3y"));
    }
}
