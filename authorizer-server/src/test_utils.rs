use crate::config::AuthorizerConfig;
use crate::create_app;
use crate::state::AppState;
use async_trait::async_trait;
use authorizer_core::{HttpIdentityProvider, SecretStore, SecretStoreError};
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

pub const METHOD_ARN: &str = "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/test";

/// Path of the introspection endpoint on the identity provider mock
pub const INTROSPECT_PATH: &str = "/oauth2/default/v1/introspect";

/// In-memory secret store keyed by secret name
pub struct StaticSecretStore {
    secrets: HashMap<String, String>,
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, name: &str) -> Result<String, SecretStoreError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }
}

/// Test fixture for setting up a complete test environment with mocked services.
///
/// The identity provider is a wiremock server; the secret store is an
/// in-memory map whose identity-provider secret points at that server.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     fixture.add_introspection_mock(json!({ "active": true }), 1).await;
///
///     let response = fixture.post("/authorize", &event).await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub config: AuthorizerConfig,
    /// Mock server for the identity provider
    pub idp_mock: MockServer,
}

impl TestFixture {
    /// Creates a new test fixture backed by a fresh identity provider mock
    pub async fn new() -> Self {
        // Initialize test logger
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let idp_mock = MockServer::start().await;
        let config = AuthorizerConfig::for_test();

        let idp_secret = json!({
            "client_id": "client-1",
            "audience": "api://hoth",
            "issuer": format!("{}/oauth2/default", idp_mock.uri()),
        });
        let store = StaticSecretStore {
            secrets: HashMap::from([
                (config.secrets.secret_name.clone(), idp_secret.to_string()),
                (
                    config.secrets.app_secret_name().to_string(),
                    json!({ "message": "ok" }).to_string(),
                ),
            ]),
        };

        let state = AppState::with_collaborators(
            config.clone(),
            Arc::new(store),
            Arc::new(HttpIdentityProvider::new(reqwest::Client::new())),
        );
        let app = create_app(state).await;

        Self {
            app,
            config,
            idp_mock,
        }
    }

    /// Creates a request builder with a JSON content type
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    /// Sends a GET request to the specified URI
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body to the specified URI
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse { status, json }
    }

    /// Mounts an introspection answer on the identity provider mock.
    ///
    /// The mock server verifies `expected_calls` when the fixture is dropped.
    pub async fn add_introspection_mock(&self, response_body: impl Serialize, expected_calls: u64) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(INTROSPECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .expect(expected_calls)
            .mount(&self.idp_mock)
            .await;
    }
}

/// Response from a test request that provides convenient access to status and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}
