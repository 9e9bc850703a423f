use super::cache::{CacheEntry, SecretCache};
use super::store::{SecretStore, SecretStoreError};
use super::{SecretConfig, SecretDocument, SecretError};
use crate::retry::{Deadline, RetryError, RetryPolicy, retry_with_backoff};
use log::{debug, info, warn};
use std::sync::Arc;

/// Resolves one named secret through the shared process cache
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    cache: SecretCache,
    secret_name: String,
    retry: RetryPolicy,
    fallback_domain: Option<String>,
}

impl SecretResolver {
    pub fn new(
        store: Arc<dyn SecretStore>,
        cache: SecretCache,
        secret_name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            secret_name: secret_name.into(),
            retry,
            fallback_domain: None,
        }
    }

    /// Domain used when the secret names neither an issuer nor a domain
    pub fn with_fallback_domain(mut self, domain: Option<String>) -> Self {
        self.fallback_domain = domain;
        self
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Resolves the identity-provider configuration for `environment`
    pub async fn resolve(
        &self,
        environment: &str,
        deadline: &Deadline,
    ) -> Result<SecretConfig, SecretError> {
        let document = self.resolve_document(environment, deadline).await?;
        SecretConfig::from_document(&document, self.fallback_domain.as_deref())
    }

    /// Returns the secret document for `environment`, fetching it when the
    /// cache holds no fresh copy.
    ///
    /// Concurrent misses on the same key share a single store call. A failed
    /// fetch leaves nothing in the cache.
    pub async fn resolve_document(
        &self,
        environment: &str,
        deadline: &Deadline,
    ) -> Result<Arc<SecretDocument>, SecretError> {
        let key = format!("{}/{}", environment, self.secret_name);

        if let Some(entry) = self.cache.get_fresh(&key).await {
            debug!("Secret cache hit for key: {}", key);
            return Ok(entry.value());
        }
        debug!("Secret cache miss for key: {}", key);

        match self
            .cache
            .entries
            .try_get_with(key.clone(), self.fetch(deadline))
            .await
        {
            Ok(entry) => Ok(entry.value()),
            Err(err) => {
                self.cache.invalidate(&key).await;
                Err(err.as_ref().clone())
            }
        }
    }

    async fn fetch(&self, deadline: &Deadline) -> Result<CacheEntry, SecretError> {
        let result = retry_with_backoff(
            &self.retry,
            deadline,
            "get_secret",
            SecretStoreError::is_transient,
            || self.store.get_secret(&self.secret_name),
        )
        .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(RetryError::Exhausted { attempts, last }) => {
                return Err(SecretError::Fetch {
                    attempts,
                    message: last.to_string(),
                });
            }
            Err(RetryError::Rejected(err)) => {
                warn!("Secret '{}' cannot be used: {}", self.secret_name, err);
                return Err(SecretError::Configuration(err.to_string()));
            }
            Err(RetryError::DeadlineExceeded) => return Err(SecretError::DeadlineExceeded),
        };

        let document = SecretDocument::parse(&raw)?;
        info!(
            "Retrieved secret '{}' from the secret store ({} field(s))",
            self.secret_name,
            document.len()
        );
        Ok(CacheEntry::new(document, self.cache.ttl()))
    }
}
