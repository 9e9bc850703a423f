//! The fail-closed authorization pipeline.
//!
//! An invocation moves through [`PipelineState`] one stage at a time:
//!
//! ```text
//! Received -> TokenExtracted -> SecretResolved -> Verified -> Decided
//! ```
//!
//! Any stage may jump straight to `Decided` with a Deny. Whatever happens,
//! [`Authorizer::authorize`] returns a decision and never an error.

use crate::decision::{self, AuthDecision};
use crate::error::PipelineError;
use crate::request::{self, AuthRequest};
use crate::retry::Deadline;
use crate::secrets::{SecretConfig, SecretResolver};
use crate::verifier::{TokenVerifier, VerificationResult};
use log::{debug, info};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(5);

enum PipelineState<'a> {
    Received(&'a Value),
    TokenExtracted(AuthRequest),
    SecretResolved(AuthRequest, SecretConfig),
    Verified(AuthRequest, Result<VerificationResult, PipelineError>),
    Decided(AuthDecision),
}

impl PipelineState<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Received(_) => "received",
            Self::TokenExtracted(_) => "token_extracted",
            Self::SecretResolved(..) => "secret_resolved",
            Self::Verified(..) => "verified",
            Self::Decided(_) => "decided",
        }
    }
}

/// Request-time authorizer shared by every invocation of the process
#[derive(Clone)]
pub struct Authorizer {
    resolver: SecretResolver,
    verifier: TokenVerifier,
    environment: String,
    invocation_timeout: Duration,
    require_client_id: bool,
}

impl Authorizer {
    pub fn new(
        resolver: SecretResolver,
        verifier: TokenVerifier,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            verifier,
            environment: environment.into(),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            require_client_id: false,
        }
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Deny requests that present no client identifier
    pub fn with_require_client_id(mut self, require: bool) -> Self {
        self.require_client_id = require;
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Decides whether the call described by `event` may proceed
    pub async fn authorize(&self, event: &Value) -> AuthDecision {
        let deadline = Deadline::after(self.invocation_timeout);
        match tokio::time::timeout(self.invocation_timeout, self.run(event, &deadline)).await {
            Ok(decision) => decision,
            Err(_) => fail(
                &request::fallback_resource_id(event),
                PipelineError::DeadlineExceeded,
            ),
        }
    }

    async fn run(&self, event: &Value, deadline: &Deadline) -> AuthDecision {
        let mut state = PipelineState::Received(event);
        loop {
            debug!("Authorizer pipeline state: {}", state.name());
            state = match state {
                PipelineState::Decided(decision) => return decision,
                state => self.step(state, deadline).await,
            };
        }
    }

    async fn step<'a>(&self, state: PipelineState<'a>, deadline: &Deadline) -> PipelineState<'a> {
        match state {
            PipelineState::Received(event) => match request::adapt(event) {
                Ok(request) => PipelineState::TokenExtracted(request),
                Err(err) => decided(&request::fallback_resource_id(event), err.into()),
            },
            PipelineState::TokenExtracted(request) => {
                if !request.has_token() {
                    return decided(&request.resource_id, PipelineError::CredentialMissing);
                }
                if self.require_client_id && request.client_id.is_none() {
                    return decided(&request.resource_id, PipelineError::ClientIdMissing);
                }
                match self.resolver.resolve(&self.environment, deadline).await {
                    Ok(config) => PipelineState::SecretResolved(request, config),
                    Err(err) => decided(&request.resource_id, err.into()),
                }
            }
            PipelineState::SecretResolved(request, config) => {
                if request
                    .client_id
                    .as_ref()
                    .is_some_and(|client_id| *client_id != config.client_id)
                {
                    return decided(&request.resource_id, PipelineError::ClientMismatch);
                }
                let outcome = self
                    .verifier
                    .verify(&request.token, &config, deadline)
                    .await
                    .map_err(PipelineError::from);
                PipelineState::Verified(request, outcome)
            }
            PipelineState::Verified(request, outcome) => {
                if let Err(err) = &outcome {
                    err.log();
                }
                let decision = decision::decide(&request, &outcome);
                if decision.is_allowed() {
                    info!(
                        "Allowing {} {} for principal {}",
                        request.method.as_deref().unwrap_or("-"),
                        request.path.as_deref().unwrap_or("-"),
                        decision.principal_id
                    );
                }
                PipelineState::Decided(decision)
            }
            decided @ PipelineState::Decided(_) => decided,
        }
    }
}

fn decided(resource: &str, err: PipelineError) -> PipelineState<'static> {
    PipelineState::Decided(fail(resource, err))
}

fn fail(resource: &str, err: PipelineError) -> AuthDecision {
    err.log();
    decision::deny(resource, &err)
}
