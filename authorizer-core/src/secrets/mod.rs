//! Trusted configuration sourced from a secret store.
//!
//! The identity-provider metadata the authorizer needs (client id, audience,
//! issuer...) lives in a secret, never in plain configuration. This module
//! parses that secret into a validated [`SecretConfig`] and keeps it in a
//! per-process cache owned by [`SecretResolver`].

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;
use url::Url;

pub mod cache;
pub mod resolver;
pub mod store;

pub use cache::{CacheEntry, SecretCache};
pub use resolver::SecretResolver;

/// Errors that can occur while resolving the secret configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// The secret store could not be reached within the retry budget
    #[error("Secret store unavailable after {attempts} attempt(s): {message}")]
    Fetch { attempts: u32, message: String },

    /// The secret exists but does not hold a usable configuration
    #[error("Secret configuration invalid: {0}")]
    Configuration(String),

    #[error("Secret fetch abandoned: deadline exceeded")]
    DeadlineExceeded,
}

/// A secret blob parsed as a JSON object.
///
/// The content is never printed; `Debug` only shows how many fields it holds.
#[derive(Clone, PartialEq)]
pub struct SecretDocument {
    fields: Map<String, Value>,
    fetched_at: SystemTime,
}

impl SecretDocument {
    /// Parses the raw secret string fetched from the store
    pub fn parse(raw: &str) -> Result<Self, SecretError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(fields)) => Ok(Self {
                fields,
                fetched_at: SystemTime::now(),
            }),
            Ok(_) => Err(SecretError::Configuration(
                "secret is not a JSON object".to_string(),
            )),
            Err(e) => Err(SecretError::Configuration(format!(
                "secret is not valid JSON (line {}, column {})",
                e.line(),
                e.column()
            ))),
        }
    }

    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// String value of a top-level field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl fmt::Debug for SecretDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretDocument")
            .field("fields", &self.fields.len())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

/// Identity-provider configuration validated out of a [`SecretDocument`]
#[derive(Clone, PartialEq, Eq)]
pub struct SecretConfig {
    pub client_id: String,
    client_secret: Option<String>,
    pub audience: String,
    pub issuer: String,
    pub domain: String,
    pub required_scopes: Vec<String>,
    pub fetched_at: SystemTime,
}

/// Field layout of the secret blob; both snake_case and camelCase keys are
/// accepted
#[derive(Deserialize)]
struct RawSecretConfig {
    #[serde(default, alias = "clientId")]
    client_id: Option<String>,
    #[serde(default, alias = "clientSecret")]
    client_secret: Option<String>,
    #[serde(default)]
    audience: Option<String>,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default, alias = "requiredScopes")]
    required_scopes: Option<ScopeList>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeList {
    Delimited(String),
    List(Vec<String>),
}

impl ScopeList {
    fn into_scopes(self) -> Vec<String> {
        let scopes: Vec<String> = match self {
            Self::Delimited(scopes) => scopes.split_whitespace().map(str::to_string).collect(),
            Self::List(scopes) => scopes,
        };
        scopes
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SecretConfig {
    /// Validates a secret document into a usable configuration.
    ///
    /// `client_id` and `audience` must be present. The issuer is taken from
    /// the document, or derived from its `domain`, or from `fallback_domain`;
    /// having none of them is a configuration error.
    pub fn from_document(
        document: &SecretDocument,
        fallback_domain: Option<&str>,
    ) -> Result<Self, SecretError> {
        let raw = RawSecretConfig::deserialize(Value::Object(document.fields().clone()))
            .map_err(|e| SecretError::Configuration(format!("unexpected field type: {e}")))?;

        let client_id = non_empty(raw.client_id);
        let audience = non_empty(raw.audience);
        let issuer = non_empty(raw.issuer);
        let domain = non_empty(raw.domain)
            .or_else(|| issuer.as_deref().and_then(domain_of))
            .or_else(|| non_empty(fallback_domain.map(str::to_string)));

        let mut missing = Vec::new();
        if client_id.is_none() {
            missing.push("client_id");
        }
        if audience.is_none() {
            missing.push("audience");
        }
        if issuer.is_none() && domain.is_none() {
            missing.push("issuer or domain");
        } else if domain.is_none() {
            missing.push("domain");
        }
        let (Some(client_id), Some(audience), Some(domain)) = (client_id, audience, domain) else {
            return Err(SecretError::Configuration(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        };

        let issuer = issuer.unwrap_or_else(|| format!("https://{domain}/oauth2/default"));
        Url::parse(&issuer)
            .map_err(|e| SecretError::Configuration(format!("issuer is not a valid URL: {e}")))?;

        Ok(Self {
            client_id,
            client_secret: non_empty(raw.client_secret),
            audience,
            issuer,
            domain,
            required_scopes: raw
                .required_scopes
                .map(ScopeList::into_scopes)
                .unwrap_or_default(),
            fetched_at: document.fetched_at(),
        })
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// RFC 7662 introspection endpoint of the configured issuer
    pub fn introspection_url(&self) -> Result<Url, SecretError> {
        let endpoint = format!("{}/v1/introspect", self.issuer.trim_end_matches('/'));
        Url::parse(&endpoint)
            .map_err(|e| SecretError::Configuration(format!("invalid introspection URL: {e}")))
    }
}

impl fmt::Debug for SecretConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("domain", &self.domain)
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

fn domain_of(issuer: &str) -> Option<String> {
    Url::parse(issuer)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}
