use crate::request::MalformedRequestError;
use crate::secrets::SecretError;
use crate::verifier::VerifierError;
use log::{error, info, warn};
use thiserror::Error;

/// Every way the authorization pipeline can fail.
///
/// Each variant ends the pipeline with a Deny decision; none of them is ever
/// surfaced to the gateway as a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Malformed authorizer event: {0}")]
    Client(String),

    #[error("No bearer credential presented")]
    CredentialMissing,

    #[error("Client identifier does not match the configured client")]
    ClientMismatch,

    #[error("No client identifier presented")]
    ClientIdMissing,

    #[error("Authorization service misconfigured: {0}")]
    Configuration(String),

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Authorization deadline exceeded")]
    DeadlineExceeded,

    #[error("Token rejected: {0}")]
    Verification(String),
}

impl PipelineError {
    /// Generic reason code attached to the Deny decision context
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Client(_) => "malformed_request",
            Self::CredentialMissing => "missing_token",
            Self::ClientMismatch => "client_mismatch",
            Self::ClientIdMissing => "missing_client_id",
            Self::Configuration(_) => "misconfigured",
            Self::Dependency(_) => "dependency_unavailable",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Verification(_) => "invalid_token",
        }
    }

    /// Principal marker used on the Deny decision
    pub fn principal_marker(&self) -> &'static str {
        match self {
            Self::Client(_) | Self::CredentialMissing | Self::ClientIdMissing => "anonymous",
            Self::Configuration(_) => "system",
            Self::ClientMismatch | Self::Verification(_) => "invalid_token",
            Self::Dependency(_) | Self::DeadlineExceeded => "error",
        }
    }

    /// Logs the failure at the level matching its operational meaning.
    ///
    /// Misconfiguration is critical, dependency trouble is transient and a
    /// rejected token is a normal security outcome.
    pub fn log(&self) {
        match self {
            Self::Configuration(_) => error!("Denying request, critical misconfiguration: {self}"),
            Self::Dependency(_) | Self::DeadlineExceeded => {
                warn!("Denying request, transient dependency failure: {self}")
            }
            Self::Verification(_) => info!("Denying request: {self}"),
            Self::Client(_)
            | Self::CredentialMissing
            | Self::ClientMismatch
            | Self::ClientIdMissing => {
                warn!("Denying request: {self}")
            }
        }
    }
}

impl From<MalformedRequestError> for PipelineError {
    fn from(err: MalformedRequestError) -> Self {
        Self::Client(err.to_string())
    }
}

impl From<SecretError> for PipelineError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::Configuration(detail) => Self::Configuration(detail),
            SecretError::Fetch { .. } => Self::Dependency(err.to_string()),
            SecretError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<VerifierError> for PipelineError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::Configuration(detail) => Self::Configuration(detail),
            VerifierError::Unavailable { .. } | VerifierError::Rejected(_) => {
                Self::Dependency(err.to_string())
            }
            VerifierError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}
