//! # authorizer-core
//!
//! The request-time authorization pipeline invoked by an API gateway on every
//! inbound call, and the protected handler that runs once a call is allowed.
//!
//! ## Components
//!
//! - **Request:** Normalizes gateway authorizer events into an [`AuthRequest`].
//! - **Secrets:** Fetches and caches trusted configuration from a secret store.
//! - **Verifier:** Asks the identity provider whether a bearer token is valid.
//! - **Decision:** Turns a verification outcome into an Allow/Deny policy.
//! - **Pipeline:** The fail-closed state machine wiring the above together.
//! - **Handler:** The business endpoint guarded by the authorizer.

pub mod decision;
pub mod error;
pub mod handler;
pub mod pipeline;
pub mod request;
pub mod retry;
pub mod secrets;
pub mod verifier;

pub use decision::{AuthDecision, Effect, PolicyDocument, Statement};
pub use error::PipelineError;
pub use handler::{ProtectedHandler, ProxyEvent, ProxyResponse, ServiceStatus};
pub use pipeline::Authorizer;
pub use request::{AuthRequest, MalformedRequestError};
pub use retry::{Deadline, RetryPolicy};
pub use secrets::{
    SecretCache, SecretConfig, SecretDocument, SecretError, SecretResolver,
    store::{AwsSecretStore, EnvSecretStore, SecretStore, SecretStoreError},
};
pub use verifier::{
    HttpIdentityProvider, IdentityProvider, IntrospectionResponse, ProviderError, TokenVerifier,
    VerificationResult, VerifierError,
};
