pub(crate) use crate::config::secrets::{SecretStoreKind, SecretsConfig};
pub(crate) use crate::config::verifier::VerifierConfig;
use authorizer_core::RetryPolicy;
use confique::Config;
use std::time::Duration;

pub mod secrets;
pub mod verifier;

/// Main configuration structure for the authorizer server
#[derive(Debug, Config, Clone)]
pub struct AuthorizerConfig {
    /// The port the server will listen to (default: 7766)
    #[config(env = "PORT", default = 7766)]
    pub port: u16,

    /// Deployment environment, also part of the secret cache key (default: dev)
    #[config(env = "ENVIRONMENT", default = "dev")]
    pub environment: String,

    /// Deadline for a whole authorization in milliseconds (default: 5000)
    #[config(env = "INVOCATION_TIMEOUT_MS", default = 5000)]
    pub invocation_timeout_ms: u64,

    /// Deny requests that present no client identifier (default: false)
    #[config(env = "REQUIRE_CLIENT_ID", default = false)]
    pub require_client_id: bool,

    /// Attempts allowed for a transiently failing call, first one included
    /// (default: 2)
    #[config(env = "RETRY_BUDGET", default = 2)]
    pub retry_budget: u32,

    /// Backoff before the second attempt in milliseconds, doubled and jittered
    /// afterwards (default: 100)
    #[config(env = "RETRY_BACKOFF_MS", default = 100)]
    pub retry_backoff_ms: u64,

    /// Secret store configuration
    #[config(nested)]
    pub secrets: SecretsConfig,

    /// Identity provider configuration
    #[config(nested)]
    pub verifier: VerifierConfig,
}

impl AuthorizerConfig {
    /// Creates a new Config instance from environment variables
    pub fn new() -> Result<Self, String> {
        let config = Self::builder().env().load().map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.secrets.secret_name.trim().is_empty() {
            return Err("SECRET_NAME must not be empty".to_string());
        }
        if self.retry_budget == 0 {
            return Err("RETRY_BUDGET must be at least 1".to_string());
        }
        self.secrets.store_kind()?;
        Ok(())
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    /// Retry policy of the secret store calls
    pub fn secret_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_budget, self.secrets.fetch_timeout())
            .with_initial_delay(Duration::from_millis(self.retry_backoff_ms))
    }

    /// Retry policy of the identity provider calls
    pub fn verifier_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_budget, self.verifier.timeout())
            .with_initial_delay(Duration::from_millis(self.retry_backoff_ms))
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            environment: "test".to_string(),
            invocation_timeout_ms: 5000,
            require_client_id: false,
            retry_budget: 2,
            retry_backoff_ms: 5,
            secrets: SecretsConfig {
                secret_name: "hoth/okta".to_string(),
                app_secret_name: Some("hoth/app".to_string()),
                store: "env".to_string(),
                cache_ttl: 300,
                fetch_timeout_ms: 500,
            },
            verifier: VerifierConfig {
                timeout_ms: 500,
                idp_domain: None,
            },
        }
    }
}
