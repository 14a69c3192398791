use axum::routing::{get, post};
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::api::error::ErrorResponse;
use crate::api::handlers::auth::{
    CredentialsRequest, ForgotPasswordRequest, LoginResponse, MessageResponse,
    ResetPasswordRequest,
};
use crate::api::handlers::auth::{
    __path_forgot_password_handler, __path_login_handler, __path_register_handler,
    __path_reset_password_handler,
};
use crate::api::handlers::auth::{
    forgot_password_handler, login_handler, register_handler, reset_password_handler,
};
use crate::api::handlers::health::__path_health_checker_handler;
use crate::api::handlers::health::health_checker_handler;
use crate::app_state::SharedAppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_checker_handler,
        login_handler,
        register_handler,
        forgot_password_handler,
        reset_password_handler,
    ),
    components(
        schemas(
            CredentialsRequest, ForgotPasswordRequest, ResetPasswordRequest,
            LoginResponse, MessageResponse, ErrorResponse
        )
    ),
    tags(
        (name = "vetshield", description = "guarded authentication api")
    )
)]
pub struct ApiDoc;

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub struct ApiRoutes;

impl ApiRoutes {
    pub fn create(state: SharedAppState) -> Router {
        Router::new()
            .route("/api/v1/auth/login", post(login_handler))
            .route("/api/v1/auth/register", post(register_handler))
            .route("/api/v1/auth/forgot-password", post(forgot_password_handler))
            .route("/api/v1/auth/reset-password", post(reset_password_handler))
            .route("/api/v1/health", get(health_checker_handler))
            .route("/api-docs/openapi.json", get(openapi_handler))
            .with_state(state)
    }
}
