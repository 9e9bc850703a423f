use crate::errors::ApiError;
use crate::openapi::HANDLER_TAG;
use crate::state::AppState;
use authorizer_core::ProxyEvent;
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use http::StatusCode;

/// Runs the protected handler for a proxy event the gateway already allowed
#[utoipa::path(
    post,
    path = "/invoke",
    tag = HANDLER_TAG,
    request_body(content = Object, description = "Gateway proxy event"),
    responses(
        (status = 200, description = "Proxy response with statusCode, headers and body", body = Object),
        (status = 400, description = "Body is not a proxy event")
    )
)]
pub(crate) async fn invoke_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let event: ProxyEvent = serde_json::from_slice(&body)?;
    let response = state.handler.handle(&event).await;
    Ok((StatusCode::OK, Json(response)).into_response())
}

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/invoke", post(invoke_handler))
}
