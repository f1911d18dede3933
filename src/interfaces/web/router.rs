use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use super::AppState;
use super::auth;
use super::handlers::{self, error_response, logs, mom, workflows};

/// `scheme://host[:port]` of `frontend_url`, dropping any path.
fn frontend_origin(frontend_url: &str) -> Option<HeaderValue> {
    let url = url::Url::parse(frontend_url).ok()?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return None;
    }
    origin.ascii_serialization().parse().ok()
}

/// Only the configured frontend may call with credentials.
fn build_frontend_cors(frontend_url: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = match frontend_origin(frontend_url) {
        Some(value) => vec![value],
        None => {
            warn!("FRONTEND_URL '{}' is not a valid origin; CORS disabled", frontend_url);
            Vec::new()
        }
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub(crate) fn build_api_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/auth/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::callback))
        .with_state(state.clone());

    let authed_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/test-token", get(handlers::auth::test_token))
        .route(
            "/workflow",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route(
            "/workflow/{id}",
            get(workflows::get_workflow).delete(workflows::delete_workflow),
        )
        .route("/workflow/run/{id}", post(workflows::run_workflow))
        .route("/mom/generate", post(mom::generate_mom))
        .route("/logs", get(logs::list_logs))
        .route("/logs/{id}", get(logs::get_log))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .with_state(state.clone());

    public_routes
        .merge(authed_routes)
        .fallback(route_not_found)
        .layer(middleware::from_fn(security_headers))
        .layer(build_frontend_cors(&state.config.frontend_url))
}

async fn route_not_found() -> axum::response::Response {
    error_response(StatusCode::NOT_FOUND, "Route not found")
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::web::auth::SESSION_COOKIE;
    use crate::interfaces::web::testing::{GOOD_CODE, send, signed_in_user, test_state};
    use tower::util::ServiceExt;

    fn location(headers: &axum::http::HeaderMap) -> String {
        headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn health_is_public_and_carries_security_headers() {
        let (status, headers, body) =
            send(build_api_router(test_state()), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_str().is_some());
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, headers, body) =
            send(build_api_router(test_state()), Method::GET, "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Route not found");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let app = build_api_router(test_state());
        for (method, path) in [
            (Method::GET, "/auth/me"),
            (Method::POST, "/auth/logout"),
            (Method::GET, "/workflow"),
            (Method::POST, "/workflow/run/abc"),
            (Method::POST, "/mom/generate"),
            (Method::GET, "/logs"),
        ] {
            let (status, _, body) = send(app.clone(), method, path, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
            assert_eq!(body["error"], "Unauthorized. Please login.");
        }
    }

    #[test]
    fn frontend_origin_drops_path() {
        assert_eq!(
            frontend_origin("https://app.contoso.com/portal/").unwrap(),
            "https://app.contoso.com"
        );
        assert_eq!(
            frontend_origin("http://localhost:3000").unwrap(),
            "http://localhost:3000"
        );
        assert!(frontend_origin("not a url").is_none());
    }

    #[tokio::test]
    async fn cors_preflight_allows_frontend_with_credentials() {
        let app = build_api_router(test_state());
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/workflow")
            .header("origin", "http://app.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let headers = resp.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "http://app.example"
        );
        assert_eq!(
            headers.get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn login_redirects_to_identity_provider_with_state() {
        let (status, headers, _) =
            send(build_api_router(test_state()), Method::GET, "/auth/login", None, None).await;
        assert_eq!(status, StatusCode::FOUND);
        let url = location(&headers);
        assert!(url.starts_with("https://login.example/authorize?state="));
        assert!(url.len() > "https://login.example/authorize?state=".len());
    }

    #[tokio::test]
    async fn callback_errors_redirect_to_login_page() {
        let app = build_api_router(test_state());

        let (status, headers, _) = send(
            app.clone(),
            Method::GET,
            "/auth/callback?error=access_denied",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "http://app.example/login?error=access_denied");

        let (_, headers, _) =
            send(app.clone(), Method::GET, "/auth/callback", None, None).await;
        assert_eq!(location(&headers), "http://app.example/login?error=no_code");

        let (_, headers, _) = send(
            app,
            Method::GET,
            &format!("/auth/callback?code={}&state=forged", GOOD_CODE),
            None,
            None,
        )
        .await;
        assert_eq!(location(&headers), "http://app.example/login?error=invalid_state");
    }

    #[tokio::test]
    async fn failed_code_exchange_redirects_with_auth_failed() {
        let state = test_state();
        let login_state = state.pending_logins.issue().await;
        let (_, headers, _) = send(
            build_api_router(state),
            Method::GET,
            &format!("/auth/callback?code=expired&state={}", login_state),
            None,
            None,
        )
        .await;
        assert_eq!(location(&headers), "http://app.example/login?error=auth_failed");
    }

    #[tokio::test]
    async fn sign_in_round_trip_then_logout() {
        let state = test_state();
        let login_state = state.pending_logins.issue().await;
        let app = build_api_router(state);

        let (status, headers, _) = send(
            app.clone(),
            Method::GET,
            &format!("/auth/callback?code={}&state={}", GOOD_CODE, login_state),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(location(&headers), "http://app.example/dashboard");
        let cookie = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        let session = cookie
            .strip_prefix(&format!("{}=", SESSION_COOKIE))
            .and_then(|rest| rest.split(';').next())
            .unwrap()
            .to_string();

        let (status, _, me) = send(app.clone(), Method::GET, "/auth/me", None, Some(&session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["azureId"], "azure-ada");
        assert_eq!(me["email"], "ada@contoso.com");
        assert_eq!(me["name"], "Ada Lovelace");
        assert!(me.get("accessToken").is_none());

        let (status, headers, body) =
            send(app.clone(), Method::POST, "/auth/logout", None, Some(&session)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully");
        assert!(
            headers
                .get(header::SET_COOKIE)
                .and_then(|v| v.to_str().ok())
                .unwrap()
                .contains("Max-Age=0")
        );

        let (status, _, _) = send(app, Method::GET, "/auth/me", None, Some(&session)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_state_is_single_use() {
        let state = test_state();
        let login_state = state.pending_logins.issue().await;
        let app = build_api_router(state);
        let path = format!("/auth/callback?code={}&state={}", GOOD_CODE, login_state);

        let (_, headers, _) = send(app.clone(), Method::GET, &path, None, None).await;
        assert_eq!(location(&headers), "http://app.example/dashboard");
        let (_, headers, _) = send(app, Method::GET, &path, None, None).await;
        assert_eq!(location(&headers), "http://app.example/login?error=invalid_state");
    }

    #[tokio::test]
    async fn test_token_reports_graph_failure() {
        let state = test_state();
        let (_, session) = signed_in_user(&state.store).await;

        let (status, _, body) = send(
            build_api_router(state),
            Method::GET,
            "/auth/test-token",
            None,
            Some(&session),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Token test failed");
        assert!(body["details"].as_str().is_some());
        assert_eq!(body["reauthenticate"], true);
    }
}
