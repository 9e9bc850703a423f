use crate::error::PipelineError;
use crate::request::AuthRequest;
use crate::verifier::VerificationResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub action: String,
    pub effect: Effect,
    pub resource: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

/// The authorizer's answer to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDecision {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl AuthDecision {
    fn new(
        effect: Effect,
        principal_id: String,
        resource: &str,
        context: BTreeMap<String, String>,
    ) -> Self {
        Self {
            principal_id,
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![Statement {
                    action: INVOKE_ACTION.to_string(),
                    effect,
                    resource: resource.to_string(),
                }],
            },
            context,
        }
    }

    pub fn effect(&self) -> Effect {
        self.policy_document
            .statement
            .first()
            .map(|statement| statement.effect)
            .unwrap_or(Effect::Deny)
    }

    pub fn is_allowed(&self) -> bool {
        self.effect() == Effect::Allow
    }
}

/// Builds the decision for a request from its verification outcome.
///
/// Only a valid verification allows; everything else denies with a generic
/// reason. The result depends on nothing but the inputs.
pub fn decide(
    request: &AuthRequest,
    outcome: &Result<VerificationResult, PipelineError>,
) -> AuthDecision {
    match outcome {
        Ok(verification) if verification.valid => allow(request, verification),
        Ok(verification) => deny(
            &request.resource_id,
            &PipelineError::Verification(
                verification
                    .error_reason
                    .clone()
                    .unwrap_or_else(|| "token_inactive".to_string()),
            ),
        ),
        Err(err) => deny(&request.resource_id, err),
    }
}

/// Deny decision for `resource` carrying only the failure's reason code
pub fn deny(resource: &str, err: &PipelineError) -> AuthDecision {
    let context = BTreeMap::from([("reason".to_string(), err.reason_code().to_string())]);
    AuthDecision::new(
        Effect::Deny,
        err.principal_marker().to_string(),
        resource,
        context,
    )
}

fn allow(request: &AuthRequest, verification: &VerificationResult) -> AuthDecision {
    let principal_id = verification
        .subject
        .clone()
        .unwrap_or_else(|| token_fingerprint(&request.token));

    let mut context = BTreeMap::new();
    context.insert("principalId".to_string(), principal_id.clone());
    if let Some(client_id) = verification
        .client_id
        .as_ref()
        .or(request.client_id.as_ref())
    {
        context.insert("clientId".to_string(), client_id.clone());
    }
    if !verification.scopes.is_empty() {
        context.insert("scope".to_string(), verification.scope());
    }
    if let Some(token_type) = &verification.token_type {
        context.insert("tokenType".to_string(), token_type.clone());
    }

    AuthDecision::new(Effect::Allow, principal_id, &request.resource_id, context)
}

/// Stable, non-reversible principal for tokens whose provider reports no subject
fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("token:{hex}")
}
