use axum::Json;

use crate::core::store::now_timestamp;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": now_timestamp(),
    }))
}
