use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;

use super::super::AppState;

pub async fn schema_endpoint(State(state): State<AppState>) -> axum::response::Response {
    match state.agent.schema().await {
        Ok(schema) => Json(serde_json::json!({ "tables": schema })).into_response(),
        Err(e) => {
            warn!("Schema endpoint failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn health_endpoint() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
