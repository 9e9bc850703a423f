//! The business endpoint guarded by the authorizer.

use crate::retry::Deadline;
use crate::secrets::{SecretDocument, SecretResolver};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const DEFAULT_SECRET_TIMEOUT: Duration = Duration::from_secs(5);

/// Secret field the handler reads its operational status from
const STATUS_FIELD: &str = "message";

/// Operational status reported by the protected endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Ok,
    Degraded,
    Maintenance,
    Unknown,
}

impl ServiceStatus {
    /// Maps the status field of the handler secret onto a fixed vocabulary.
    ///
    /// Unrecognized or missing values map to `Unknown`; the raw value never
    /// leaves this function.
    pub fn from_document(document: &SecretDocument) -> Self {
        match document
            .get_str(STATUS_FIELD)
            .map(|value| value.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("ok") => Self::Ok,
            Some("degraded") => Self::Degraded,
            Some("maintenance") => Self::Maintenance,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Maintenance => "maintenance",
            Self::Unknown => "unknown",
        }
    }
}

/// Proxy event forwarded by the gateway once a call was allowed
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEvent {
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    pub request_context: Option<ProxyRequestContext>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProxyRequestContext {
    /// Context attached by the authorizer to its Allow decision
    #[serde(default)]
    pub authorizer: Option<HashMap<String, Value>>,
}

impl ProxyEvent {
    fn route(&self) -> &str {
        self.path
            .as_deref()
            .or(self.resource.as_deref())
            .unwrap_or("/")
    }

    fn authorizer_value(&self, key: &str) -> String {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.authorizer.as_ref())
            .and_then(|authorizer| authorizer.get(key))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON document serialized as a string
    pub body: String,
}

impl ProxyResponse {
    pub fn new(status_code: u16, body: Value) -> Self {
        let headers = BTreeMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
            (
                "Access-Control-Allow-Headers".to_string(),
                "Content-Type,Authorization,x-client-id".to_string(),
            ),
            (
                "Access-Control-Allow-Methods".to_string(),
                "GET,POST,OPTIONS".to_string(),
            ),
        ]);
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    fn internal_error() -> Self {
        Self::new(
            500,
            json!({
                "error": "Internal Server Error",
                "message": "An unexpected error occurred"
            }),
        )
    }
}

/// Serves the protected routes with its own secret-backed configuration
#[derive(Clone)]
pub struct ProtectedHandler {
    resolver: SecretResolver,
    environment: String,
    secret_timeout: Duration,
}

impl ProtectedHandler {
    pub fn new(resolver: SecretResolver, environment: impl Into<String>) -> Self {
        Self {
            resolver,
            environment: environment.into(),
            secret_timeout: DEFAULT_SECRET_TIMEOUT,
        }
    }

    pub fn with_secret_timeout(mut self, timeout: Duration) -> Self {
        self.secret_timeout = timeout;
        self
    }

    pub async fn handle(&self, event: &ProxyEvent) -> ProxyResponse {
        let route = event.route();
        info!(
            "Processing {} request to {}",
            event.http_method.as_deref().unwrap_or("GET"),
            route
        );

        match route {
            "/health" => self.health().await,
            "/test" => self.test(event).await,
            _ => ProxyResponse::new(
                404,
                json!({
                    "error": "Not Found",
                    "message": format!("Endpoint {route} not found")
                }),
            ),
        }
    }

    async fn test(&self, event: &ProxyEvent) -> ProxyResponse {
        let deadline = Deadline::after(self.secret_timeout);
        let document = match self
            .resolver
            .resolve_document(&self.environment, &deadline)
            .await
        {
            Ok(document) => document,
            Err(err) => {
                error!("Failed to load handler configuration: {}", err);
                return ProxyResponse::internal_error();
            }
        };
        let status = ServiceStatus::from_document(&document);

        ProxyResponse::new(
            200,
            json!({
                "status": status.as_str(),
                "environment": self.environment,
                "authorized": true,
                "principalId": event.authorizer_value("principalId"),
                "clientId": event.authorizer_value("clientId"),
                "configuration": "loaded"
            }),
        )
    }

    async fn health(&self) -> ProxyResponse {
        let deadline = Deadline::after(self.secret_timeout);
        let secrets_manager = match self
            .resolver
            .resolve_document(&self.environment, &deadline)
            .await
        {
            Ok(_) => "connected",
            Err(err) => {
                warn!("Secret store health check failed: {}", err);
                "error"
            }
        };

        ProxyResponse::new(
            200,
            json!({
                "status": "healthy",
                "environment": self.environment,
                "services": { "secrets_manager": secrets_manager }
            }),
        )
    }
}
