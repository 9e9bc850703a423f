#![allow(dead_code)]

use async_trait::async_trait;
use authorizer_core::{
    Authorizer, IdentityProvider, IntrospectionResponse, ProviderError, RetryPolicy, SecretCache,
    SecretConfig, SecretResolver, SecretStore, SecretStoreError, TokenVerifier,
};
use log::LevelFilter;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const METHOD_ARN: &str = "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/test";

pub fn setup_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Secret store replaying a script of results, then repeating `fallback`
pub struct ScriptedStore {
    script: Mutex<Vec<Result<String, SecretStoreError>>>,
    fallback: Result<String, SecretStoreError>,
    calls: AtomicU32,
}

impl ScriptedStore {
    pub fn new(mut script: Vec<Result<String, SecretStoreError>>) -> Arc<Self> {
        script.reverse();
        Arc::new(Self {
            script: Mutex::new(script),
            fallback: Err(SecretStoreError::Unavailable("script exhausted".to_string())),
            calls: AtomicU32::new(0),
        })
    }

    /// Store that always answers with `secret`
    pub fn always(secret: Value) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Vec::new()),
            fallback: Ok(secret.to_string()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for ScriptedStore {
    async fn get_secret(&self, _name: &str) -> Result<String, SecretStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Identity provider answering every call with the same response
pub struct FakeProvider {
    response: IntrospectionResponse,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl FakeProvider {
    pub fn answering(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response: serde_json::from_value(response).expect("Invalid introspection response"),
            delay: None,
            calls: AtomicU32::new(0),
        })
    }

    pub fn slow(response: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            response: serde_json::from_value(response).expect("Invalid introspection response"),
            delay: Some(delay),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn introspect(
        &self,
        _token: &str,
        _config: &SecretConfig,
    ) -> Result<IntrospectionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

pub struct AuthorizerBuilder {
    pub ttl: Duration,
    pub retry_budget: u32,
    pub attempt_timeout: Duration,
    pub invocation_timeout: Duration,
    pub fallback_domain: Option<String>,
    pub require_client_id: bool,
}

impl Default for AuthorizerBuilder {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            retry_budget: 2,
            attempt_timeout: Duration::from_millis(500),
            invocation_timeout: Duration::from_secs(5),
            fallback_domain: Some("hoth.okta.com".to_string()),
            require_client_id: false,
        }
    }
}

impl AuthorizerBuilder {
    pub fn build(self, store: Arc<ScriptedStore>, provider: Arc<FakeProvider>) -> Authorizer {
        let retry = RetryPolicy::new(self.retry_budget, self.attempt_timeout)
            .with_initial_delay(Duration::from_millis(5));
        let resolver = SecretResolver::new(
            store,
            SecretCache::new(self.ttl),
            "hoth/okta",
            retry.clone(),
        )
        .with_fallback_domain(self.fallback_domain);
        let verifier = TokenVerifier::new(provider, retry);

        Authorizer::new(resolver, verifier, "dev")
            .with_invocation_timeout(self.invocation_timeout)
            .with_require_client_id(self.require_client_id)
    }
}

pub fn secret() -> Value {
    json!({ "clientId": "client-1", "audience": "api://hoth" })
}

pub fn request_event(headers: Value) -> Value {
    json!({
        "type": "REQUEST",
        "methodArn": METHOD_ARN,
        "httpMethod": "GET",
        "path": "/test",
        "headers": headers,
        "requestContext": { "identity": { "sourceIp": "10.0.0.1" } }
    })
}

pub fn bearer_event(token: &str) -> Value {
    request_event(json!({
        "Authorization": format!("Bearer {token}"),
        "x-client-id": "client-1"
    }))
}
