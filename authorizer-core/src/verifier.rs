//! Token verification through remote introspection (RFC 7662).

use crate::retry::{Deadline, RetryError, RetryPolicy, retry_with_backoff};
use crate::secrets::SecretConfig;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Longest provider error body kept in an error message
const MAX_ERROR_BODY: usize = 256;

/// OAuth error codes that blame the caller's own credentials or request
const CLIENT_ERROR_CODES: [&str; 3] = ["invalid_client", "unauthorized_client", "invalid_request"];

/// Body of an introspection response.
///
/// Providers answer a 4xx with an RFC 6749 error body instead; those are
/// deserialized into the same shape with `active = false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IntrospectionResponse {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// `aud` may be a single string or a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(aud) => aud == audience,
            Self::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Structured outcome of a token verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationResult {
    pub valid: bool,
    /// Provider subject, falling back to its user id
    pub subject: Option<String>,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    /// Expiry as seconds since the epoch
    pub expiry: Option<i64>,
    pub token_type: Option<String>,
    /// Why the token was refused, `None` when valid
    pub error_reason: Option<String>,
}

impl VerificationResult {
    /// Interprets a provider response against the trusted configuration.
    ///
    /// The audience is only checked when the provider reports one. Every
    /// configured required scope must be present in the returned scopes.
    pub fn interpret(response: IntrospectionResponse, config: &SecretConfig) -> Self {
        let scopes: Vec<String> = response
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let error_reason = if !response.active {
            Some(
                response
                    .error
                    .clone()
                    .unwrap_or_else(|| "token_inactive".to_string()),
            )
        } else if response
            .aud
            .as_ref()
            .is_some_and(|aud| !aud.contains(&config.audience))
        {
            Some("audience_mismatch".to_string())
        } else if !config
            .required_scopes
            .iter()
            .all(|required| scopes.contains(required))
        {
            Some("insufficient_scope".to_string())
        } else {
            None
        };

        Self {
            valid: error_reason.is_none(),
            subject: response.sub.or(response.uid),
            client_id: response.client_id,
            scopes,
            expiry: response.exp,
            token_type: response.token_type,
            error_reason,
        }
    }

    /// Space-delimited scopes, as the provider reports them
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Errors of a single call to the identity provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to reach identity provider: {0}")]
    Transport(String),

    #[error("Identity provider request timed out")]
    Timeout,

    #[error("Identity provider answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse identity provider response: {0}")]
    Parse(String),

    #[error("Invalid introspection endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Identity provider refused the client: {0}")]
    ClientRejected(String),
}

impl ProviderError {
    /// Network failures, timeouts and 5xx answers are worth another attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Parse(_) | Self::InvalidEndpoint(_) | Self::ClientRejected(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.without_url().to_string())
        }
    }
}

/// Remote authority able to tell whether a token is currently valid
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn introspect(
        &self,
        token: &str,
        config: &SecretConfig,
    ) -> Result<IntrospectionResponse, ProviderError>;
}

/// Introspection over HTTP against `{issuer}/v1/introspect`
#[derive(Clone, Debug)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// The client should carry the per-request timeout
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn introspect(
        &self,
        token: &str,
        config: &SecretConfig,
    ) -> Result<IntrospectionResponse, ProviderError> {
        let url = config
            .introspection_url()
            .map_err(|e| ProviderError::InvalidEndpoint(e.to_string()))?;
        debug!("Introspecting token at: {}", url);

        let mut form = vec![("token", token), ("token_type_hint", "access_token")];
        let mut request = self.client.post(url).header(ACCEPT, "application/json");
        match config.client_secret() {
            Some(secret) => request = request.basic_auth(&config.client_id, Some(secret)),
            None => form.push(("client_id", config.client_id.as_str())),
        }

        let response = request.form(&form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| ProviderError::Parse(e.to_string()));
        }

        // An OAuth error body on a 4xx is an answer about the token,
        // unless it blames our own client credentials or request
        if status.is_client_error() {
            if let Ok(answer) = serde_json::from_slice::<IntrospectionResponse>(&body) {
                match answer.error.clone() {
                    Some(code) if CLIENT_ERROR_CODES.contains(&code.as_str()) => {
                        return Err(ProviderError::ClientRejected(code));
                    }
                    Some(_) => {
                        return Ok(IntrospectionResponse {
                            active: false,
                            ..answer
                        });
                    }
                    None => {}
                }
            }
        }

        let mut body = String::from_utf8_lossy(&body).into_owned();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Terminal errors of a verification; a refused token is not one of them
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifierError {
    #[error("Identity provider misconfigured: {0}")]
    Configuration(String),

    #[error("Identity provider unavailable after {attempts} attempt(s): {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),

    #[error("Token verification abandoned: deadline exceeded")]
    DeadlineExceeded,
}

/// Verifies bearer tokens with bounded retries
#[derive(Clone)]
pub struct TokenVerifier {
    provider: Arc<dyn IdentityProvider>,
    retry: RetryPolicy,
}

impl TokenVerifier {
    pub fn new(provider: Arc<dyn IdentityProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub async fn verify(
        &self,
        token: &str,
        config: &SecretConfig,
        deadline: &Deadline,
    ) -> Result<VerificationResult, VerifierError> {
        let result = retry_with_backoff(
            &self.retry,
            deadline,
            "introspect",
            ProviderError::is_transient,
            || self.provider.introspect(token, config),
        )
        .await;

        match result {
            Ok(response) => {
                let verification = VerificationResult::interpret(response, config);
                if let Some(reason) = &verification.error_reason {
                    info!("Token refused by identity provider: {}", reason);
                }
                Ok(verification)
            }
            Err(RetryError::Exhausted { attempts, last }) => Err(VerifierError::Unavailable {
                attempts,
                message: last.to_string(),
            }),
            Err(RetryError::Rejected(
                ProviderError::InvalidEndpoint(detail) | ProviderError::ClientRejected(detail),
            )) => Err(VerifierError::Configuration(detail)),
            Err(RetryError::Rejected(err)) => Err(VerifierError::Rejected(err.to_string())),
            Err(RetryError::DeadlineExceeded) => Err(VerifierError::DeadlineExceeded),
        }
    }
}
