//! Secret store backends.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use log::debug;
use thiserror::Error;

/// Errors reported by a secret store backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretStoreError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Secret store request failed: {0}")]
    Unavailable(String),

    #[error("Secret value could not be decoded: {0}")]
    Decode(String),
}

impl SecretStoreError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Read access to the system of record for sensitive configuration.
///
/// Implementations must never log the values they return.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the raw secret string stored under `name` (a name or ARN)
    async fn get_secret(&self, name: &str) -> Result<String, SecretStoreError>;
}

/// AWS Secrets Manager backend
#[derive(Clone, Debug)]
pub struct AwsSecretStore {
    client: SecretsManagerClient,
}

impl AwsSecretStore {
    pub fn new(client: SecretsManagerClient) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS credential and region chain
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_from_env().await;
        Self::new(SecretsManagerClient::new(&sdk_config))
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretStoreError> {
        debug!("Fetching secret '{}' from AWS Secrets Manager", name);

        let output = match self.client.get_secret_value().secret_id(name).send().await {
            Ok(output) => output,
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                return Err(if not_found {
                    SecretStoreError::NotFound(name.to_string())
                } else {
                    SecretStoreError::Unavailable(DisplayErrorContext(&err).to_string())
                });
            }
        };

        if let Some(value) = output.secret_string() {
            return Ok(value.to_string());
        }

        match output.secret_binary() {
            Some(blob) => String::from_utf8(blob.as_ref().to_vec())
                .map_err(|e| SecretStoreError::Decode(format!("binary secret is not UTF-8: {e}"))),
            None => Err(SecretStoreError::Decode(format!(
                "secret '{name}' has neither a string nor a binary value"
            ))),
        }
    }
}

/// Development backend that reads each secret from the environment variable
/// of the same name
#[derive(Clone, Debug, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretStoreError> {
        std::env::var(name).map_err(|_| SecretStoreError::NotFound(name.to_string()))
    }
}
