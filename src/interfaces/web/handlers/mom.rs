use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::error;

use super::error_response;
use crate::core::minutes::parse_minutes;
use crate::interfaces::web::AppState;

pub async fn generate_mom(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    let notes = payload
        .get("meetingNotes")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty());
    let Some(notes) = notes else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "meetingNotes is required and must be a non-empty string",
        );
    };

    match state.minutes.generate_minutes(notes).await {
        Ok(mom) => {
            let structured = parse_minutes(&mom);
            Json(json!({
                "success": true,
                "mom": mom,
                "structured": structured,
            }))
            .into_response()
        }
        Err(e) => {
            error!("Generate MOM error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::interfaces::web::build_api_router;
    use crate::interfaces::web::testing::{send, signed_in_user, test_state};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn blank_or_non_string_notes_are_rejected() {
        let state = test_state();
        let (_, session) = signed_in_user(&state.store).await;
        let app = build_api_router(state);

        for body in [json!({ "meetingNotes": "   " }), json!({ "meetingNotes": 42 }), json!({})] {
            let (status, _, resp) =
                send(app.clone(), Method::POST, "/mom/generate", Some(body), Some(&session)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                resp["error"],
                "meetingNotes is required and must be a non-empty string"
            );
        }
    }

    #[tokio::test]
    async fn generated_minutes_come_back_with_structure() {
        let state = test_state();
        let (_, session) = signed_in_user(&state.store).await;

        let (status, _, resp) = send(
            build_api_router(state),
            Method::POST,
            "/mom/generate",
            Some(json!({ "meetingNotes": "Discussed Q3 roadmap." })),
            Some(&session),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["success"], true);
        assert!(resp["mom"].as_str().unwrap().starts_with("# Meeting Minutes"));
        assert_eq!(resp["structured"]["overview"], "Q3 planning.");
    }

    #[tokio::test]
    async fn generator_failure_is_a_server_error() {
        let state = test_state();
        let (_, session) = signed_in_user(&state.store).await;

        let (status, _, resp) = send(
            build_api_router(state),
            Method::POST,
            "/mom/generate",
            Some(json!({ "meetingNotes": "this will fail" })),
            Some(&session),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp["success"], false);
        assert!(resp["error"].as_str().unwrap().contains("quota exceeded"));
    }
}
