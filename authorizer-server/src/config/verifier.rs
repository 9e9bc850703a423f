use confique::Config;
use std::time::Duration;

/// Configuration for the identity provider calls
#[derive(Debug, Config, Clone)]
pub struct VerifierConfig {
    /// Timeout of a single introspection request in milliseconds (default: 3000)
    #[config(env = "VERIFIER_TIMEOUT_MS", default = 3000)]
    pub timeout_ms: u64,

    /// Identity provider domain used when the secret names neither an issuer
    /// nor a domain
    #[config(env = "IDP_DOMAIN")]
    pub idp_domain: Option<String>,
}

impl VerifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
