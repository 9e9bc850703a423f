use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const AUTHORIZER_TAG: &str = "Authorizer API";
pub(crate) const HANDLER_TAG: &str = "Protected API";

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::authorizer::authorize_handler,
        crate::api::handler::invoke_handler,
    ),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = AUTHORIZER_TAG, description = "Gateway authorizer endpoints"),
        (name = HANDLER_TAG, description = "Endpoints guarded by the authorizer"),
    ),
    info(
        title = "Gateway Authorizer API",
        description = "Request-time authorization for API gateway calls",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
