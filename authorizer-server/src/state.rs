use crate::config::{AuthorizerConfig, SecretStoreKind};
use authorizer_core::{
    Authorizer, AwsSecretStore, EnvSecretStore, HttpIdentityProvider, IdentityProvider,
    ProtectedHandler, SecretCache, SecretResolver, SecretStore, TokenVerifier,
};
use http::header::ACCEPT;
use http::{HeaderMap, HeaderValue};
use log::info;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort startup
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Failed to create identity provider client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AuthorizerConfig>,
    pub authorizer: Arc<Authorizer>,
    pub handler: Arc<ProtectedHandler>,
}

impl AppState {
    fn create_idp_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // Create a specialized client for the identity provider
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2)) // 2 seconds timeout for connections
            .default_headers(headers)
            // Configure connection pool
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
    }

    /// Wires the concrete secret store and identity provider from `config`
    pub async fn new(config: AuthorizerConfig) -> Result<Self, StateError> {
        let kind = config
            .secrets
            .store_kind()
            .map_err(StateError::Configuration)?;
        let store: Arc<dyn SecretStore> = match kind {
            SecretStoreKind::Aws => Arc::new(AwsSecretStore::from_env().await),
            SecretStoreKind::Env => Arc::new(EnvSecretStore::new()),
        };
        info!("Using '{}' secret store", kind);

        let client = Self::create_idp_client(config.verifier.timeout())?;
        let provider = Arc::new(HttpIdentityProvider::new(client));
        Ok(Self::with_collaborators(config, store, provider))
    }

    /// Builds the state around the given collaborators.
    ///
    /// The authorizer and the protected handler share one secret cache.
    pub fn with_collaborators(
        config: AuthorizerConfig,
        store: Arc<dyn SecretStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let cache = SecretCache::new(config.secrets.cache_ttl());

        let resolver = SecretResolver::new(
            store.clone(),
            cache.clone(),
            config.secrets.secret_name.clone(),
            config.secret_retry_policy(),
        )
        .with_fallback_domain(config.verifier.idp_domain.clone());
        let verifier = TokenVerifier::new(provider, config.verifier_retry_policy());
        let authorizer = Authorizer::new(resolver, verifier, config.environment.clone())
            .with_invocation_timeout(config.invocation_timeout())
            .with_require_client_id(config.require_client_id);

        let app_resolver = SecretResolver::new(
            store,
            cache,
            config.secrets.app_secret_name(),
            config.secret_retry_policy(),
        );
        let handler = ProtectedHandler::new(app_resolver, config.environment.clone())
            .with_secret_timeout(config.invocation_timeout());

        Self {
            config: Arc::new(config),
            authorizer: Arc::new(authorizer),
            handler: Arc::new(handler),
        }
    }
}
