//! Secret store configuration

use confique::Config;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which secret store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStoreKind {
    /// AWS Secrets Manager
    Aws,
    /// Secrets read from environment variables (local development)
    Env,
}

impl FromStr for SecretStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "env" => Ok(Self::Env),
            other => Err(format!(
                "Unknown secret store '{}', expected 'aws' or 'env'",
                other
            )),
        }
    }
}

impl fmt::Display for SecretStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Env => write!(f, "env"),
        }
    }
}

/// Configuration of the secrets holding the identity-provider metadata
#[derive(Debug, Config, Clone)]
pub struct SecretsConfig {
    /// Name or ARN of the identity-provider configuration secret (required)
    #[config(env = "SECRET_NAME")]
    pub secret_name: String,

    /// Secret used by the protected handler (default: SECRET_NAME)
    #[config(env = "APP_SECRET_NAME")]
    pub app_secret_name: Option<String>,

    /// Secret store backend: "aws" or "env" (default: aws)
    #[config(env = "SECRET_STORE", default = "aws")]
    pub store: String,

    /// How long a fetched secret is reused, in seconds (default: 300)
    #[config(env = "SECRET_CACHE_TTL", default = 300)]
    pub cache_ttl: u64,

    /// Timeout of a single secret store call in milliseconds (default: 2000)
    #[config(env = "SECRET_FETCH_TIMEOUT_MS", default = 2000)]
    pub fetch_timeout_ms: u64,
}

impl SecretsConfig {
    pub fn store_kind(&self) -> Result<SecretStoreKind, String> {
        self.store.parse()
    }

    pub fn app_secret_name(&self) -> &str {
        self.app_secret_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.secret_name)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}
