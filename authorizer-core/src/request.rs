//! Normalization of gateway authorizer events.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use thiserror::Error;

const AUTHORIZATION_HEADER: &str = "authorization";
const CLIENT_ID_HEADER: &str = "x-client-id";
const CLIENT_ID_QUERY_PARAM: &str = "client_id";

/// The event does not have the shape of a gateway authorizer event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MalformedRequestError(pub String);

/// One inbound call to be authorized
#[derive(Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Bearer token without its scheme prefix, empty when none was presented
    pub token: String,
    /// Client identifier presented by the caller, if any
    pub client_id: Option<String>,
    /// Identifier of the resource to authorize (the gateway method ARN)
    pub resource_id: String,
    pub method: Option<String>,
    pub path: Option<String>,
    pub source_ip: Option<String>,
    /// Request headers with lower-cased names
    pub raw_headers: HashMap<String, String>,
}

impl AuthRequest {
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut header_names: Vec<&str> = self.raw_headers.keys().map(String::as_str).collect();
        header_names.sort_unstable();
        f.debug_struct("AuthRequest")
            .field("token", &if self.has_token() { "<redacted>" } else { "<empty>" })
            .field("client_id", &self.client_id)
            .field("resource_id", &self.resource_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("source_ip", &self.source_ip)
            .field("header_names", &header_names)
            .finish()
    }
}

/// Authorizer event as sent by the gateway, covering both TOKEN and REQUEST
/// authorizer types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizerEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    method_arn: Option<String>,
    #[serde(default)]
    authorization_token: Option<String>,
    #[serde(default)]
    headers: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    query_string_parameters: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    http_method: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    request_context: Option<RequestContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestContext {
    #[serde(default)]
    identity: Option<Identity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    #[serde(default)]
    source_ip: Option<String>,
}

/// Converts a raw gateway event into an [`AuthRequest`].
///
/// Missing credentials are not an error here: the request comes back with an
/// empty token so the pipeline can tell "no credential" apart from "not an
/// authorizer event".
pub fn adapt(raw: &Value) -> Result<AuthRequest, MalformedRequestError> {
    if !raw.is_object() {
        return Err(MalformedRequestError(
            "authorizer event must be a JSON object".to_string(),
        ));
    }
    let event = AuthorizerEvent::deserialize(raw)
        .map_err(|e| MalformedRequestError(format!("unexpected event shape: {e}")))?;

    if let Some(kind) = event.kind.as_deref() {
        if !kind.eq_ignore_ascii_case("TOKEN") && !kind.eq_ignore_ascii_case("REQUEST") {
            return Err(MalformedRequestError(format!(
                "unsupported authorizer type: {kind}"
            )));
        }
    }

    let resource_id = event
        .method_arn
        .filter(|arn| !arn.trim().is_empty())
        .ok_or_else(|| MalformedRequestError("missing methodArn".to_string()))?;

    if event.authorization_token.is_none() && event.headers.is_none() {
        return Err(MalformedRequestError(
            "event carries neither authorizationToken nor headers".to_string(),
        ));
    }

    let raw_headers = normalize_headers(event.headers.unwrap_or_default())?;

    let token = event
        .authorization_token
        .as_deref()
        .or_else(|| raw_headers.get(AUTHORIZATION_HEADER).map(String::as_str))
        .map(strip_bearer)
        .unwrap_or_default();

    let client_id = raw_headers
        .get(CLIENT_ID_HEADER)
        .cloned()
        .or_else(|| {
            event
                .query_string_parameters
                .as_ref()
                .and_then(|params| params.get(CLIENT_ID_QUERY_PARAM).cloned().flatten())
        })
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    let arn_route = MethodRoute::from_method_arn(&resource_id);
    let method = event
        .http_method
        .or_else(|| arn_route.as_ref().map(|route| route.method.clone()));
    let path = event
        .path
        .or_else(|| arn_route.map(|route| route.path));

    let source_ip = event
        .request_context
        .and_then(|ctx| ctx.identity)
        .and_then(|identity| identity.source_ip);

    Ok(AuthRequest {
        token,
        client_id,
        resource_id,
        method,
        path,
        source_ip,
        raw_headers,
    })
}

/// Lower-cases header names; names that collide with different values are
/// rejected since no order between them survives deserialization.
fn normalize_headers(
    headers: HashMap<String, Option<String>>,
) -> Result<HashMap<String, String>, MalformedRequestError> {
    let mut normalized = HashMap::with_capacity(headers.len());
    for (name, value) in headers {
        let Some(value) = value else { continue };
        match normalized.entry(name.to_ascii_lowercase()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(slot) if *slot.get() == value => {}
            Entry::Occupied(slot) => {
                return Err(MalformedRequestError(format!(
                    "conflicting values for header {}",
                    slot.key()
                )));
            }
        }
    }
    Ok(normalized)
}

/// Best-effort resource identifier of an event that failed to adapt
pub fn fallback_resource_id(raw: &Value) -> String {
    raw.get("methodArn")
        .and_then(Value::as_str)
        .filter(|arn| !arn.trim().is_empty())
        .unwrap_or("*")
        .to_string()
}

/// Strips a case-insensitive `Bearer ` scheme and surrounding whitespace
fn strip_bearer(value: &str) -> String {
    let value = value.trim();
    if value.eq_ignore_ascii_case("bearer") {
        return String::new();
    }
    let token = match value.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => &value[7..],
        _ => value,
    };
    token.trim().to_string()
}

/// Method and path encoded in a gateway method ARN
/// (`arn:aws:execute-api:region:account:apiId/stage/METHOD/path`)
#[derive(Debug, Clone, PartialEq, Eq)]
struct MethodRoute {
    method: String,
    path: String,
}

impl MethodRoute {
    fn from_method_arn(arn: &str) -> Option<Self> {
        let route = arn.splitn(6, ':').nth(5)?;
        let mut parts = route.splitn(4, '/');
        let _api_id = parts.next()?;
        let _stage = parts.next()?;
        let method = parts.next().filter(|m| !m.is_empty())?;
        let path = parts.next().unwrap_or_default();
        Some(Self {
            method: method.to_string(),
            path: format!("/{path}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARN: &str = "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/test";

    #[test]
    fn test_request_event() {
        let event = json!({
            "type": "REQUEST",
            "methodArn": ARN,
            "headers": {
                "Authorization": "Bearer abc123",
                "X-Client-Id": "client-1"
            },
            "httpMethod": "GET",
            "path": "/test",
            "requestContext": { "identity": { "sourceIp": "10.0.0.1" } }
        });

        let request = adapt(&event).expect("Failed to adapt event");
        assert_eq!(request.token, "abc123");
        assert_eq!(request.client_id.as_deref(), Some("client-1"));
        assert_eq!(request.resource_id, ARN);
        assert_eq!(request.method.as_deref(), Some("GET"));
        assert_eq!(request.path.as_deref(), Some("/test"));
        assert_eq!(request.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(
            request.raw_headers.get("x-client-id").map(String::as_str),
            Some("client-1")
        );
    }

    #[test]
    fn test_token_event_derives_route_from_arn() {
        let event = json!({
            "type": "TOKEN",
            "methodArn": "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/POST/register/member",
            "authorizationToken": "bearer   xyz  "
        });

        let request = adapt(&event).expect("Failed to adapt event");
        assert_eq!(request.token, "xyz");
        assert_eq!(request.client_id, None);
        assert_eq!(request.method.as_deref(), Some("POST"));
        assert_eq!(request.path.as_deref(), Some("/register/member"));
    }

    #[test]
    fn test_missing_token_is_not_malformed() {
        let event = json!({ "methodArn": ARN, "headers": {} });
        let request = adapt(&event).expect("Missing token must not be an error");
        assert!(!request.has_token());
    }

    #[test]
    fn test_token_without_scheme_is_kept() {
        let event = json!({ "methodArn": ARN, "headers": { "authorization": "raw-token" } });
        assert_eq!(adapt(&event).unwrap().token, "raw-token");

        let event = json!({ "methodArn": ARN, "headers": { "authorization": "Bearer " } });
        assert!(!adapt(&event).unwrap().has_token());
    }

    #[test]
    fn test_client_id_from_query_string() {
        let event = json!({
            "methodArn": ARN,
            "headers": {},
            "queryStringParameters": { "client_id": "client-q" }
        });
        assert_eq!(adapt(&event).unwrap().client_id.as_deref(), Some("client-q"));
    }

    #[test]
    fn test_null_header_values_are_dropped() {
        let event = json!({ "methodArn": ARN, "headers": { "authorization": null } });
        let request = adapt(&event).unwrap();
        assert!(request.raw_headers.is_empty());
        assert!(!request.has_token());
    }

    #[test]
    fn test_header_name_case_duplicates() {
        let same = json!({
            "methodArn": ARN,
            "headers": { "Authorization": "Bearer abc123", "authorization": "Bearer abc123" }
        });
        assert_eq!(adapt(&same).unwrap().token, "abc123");

        let conflicting = json!({
            "methodArn": ARN,
            "headers": { "Authorization": "Bearer abc123", "authorization": "Bearer other" }
        });
        let err = adapt(&conflicting).unwrap_err();
        assert!(err.0.contains("authorization"));
        assert!(!err.0.contains("abc123"));
    }

    #[test]
    fn test_malformed_events() {
        assert!(adapt(&json!("not an object")).is_err());
        assert!(adapt(&json!({ "headers": {} })).is_err(), "missing methodArn");
        assert!(adapt(&json!({ "methodArn": ARN })).is_err(), "missing headers");
        assert!(
            adapt(&json!({ "methodArn": ARN, "headers": "nope" })).is_err(),
            "headers of the wrong type"
        );
        assert!(
            adapt(&json!({ "type": "WEBSOCKET", "methodArn": ARN, "headers": {} })).is_err(),
            "unknown authorizer type"
        );
    }

    #[test]
    fn test_fallback_resource_id() {
        assert_eq!(fallback_resource_id(&json!({ "methodArn": ARN })), ARN);
        assert_eq!(fallback_resource_id(&json!({})), "*");
        assert_eq!(fallback_resource_id(&json!(null)), "*");
    }

    #[test]
    fn test_debug_redacts_token() {
        let event = json!({ "methodArn": ARN, "headers": { "Authorization": "Bearer s3cr3t" } });
        let request = adapt(&event).unwrap();
        let debug = format!("{request:?}");
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("<redacted>"));
    }
}
