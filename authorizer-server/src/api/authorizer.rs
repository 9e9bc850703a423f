use crate::openapi::AUTHORIZER_TAG;
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use http::StatusCode;
use log::debug;
use serde_json::Value;

/// Decides whether a gateway call may proceed.
///
/// Always answers 200 with a policy document; a body that cannot be parsed
/// is denied like any other malformed event.
#[utoipa::path(
    post,
    path = "/authorize",
    tag = AUTHORIZER_TAG,
    request_body(content = Object, description = "Gateway authorizer event (TOKEN or REQUEST)"),
    responses(
        (status = 200, description = "Allow or Deny policy for the requested resource", body = Object)
    )
)]
pub(crate) async fn authorize_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let event = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
        debug!("Authorizer event is not valid JSON: {}", e);
        Value::Null
    });
    let decision = state.authorizer.authorize(&event).await;
    (StatusCode::OK, Json(decision)).into_response()
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/authorize", post(authorize_handler))
}
