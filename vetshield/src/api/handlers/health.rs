use axum::{extract::State, response::IntoResponse, Json};

use crate::app_state::SharedAppState;

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
    (status = 200, description = "Health check")
    )
)]
pub async fn health_checker_handler(State(state): State<SharedAppState>) -> impl IntoResponse {
    let json_response = serde_json::json!({
        "status": "success",
        "timestamp": state.clock.now().to_rfc3339(),
    });

    Json(json_response)
}
