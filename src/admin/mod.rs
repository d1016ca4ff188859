//! Admin API.
//!
//! Reports the live rule snapshot and client state, and runs copy tasks.
//! Every route requires the configured bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/rules", get(get_rules))
        .route("/admin/client", get(get_client))
        .route("/admin/copy", post(post_copy))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::validation::ValidationRule;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "k".to_string();
        config.validation.rules = vec![ValidationRule::new("PUT", "/a/.*", Some("/a"))];
        let state = AppState::new(config).unwrap();
        admin_router(state.clone()).with_state(state)
    }

    fn get(uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn missing_or_wrong_key_is_rejected() {
        let response = app().oneshot(get("/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app().oneshot(get("/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rules_are_listed() {
        let response = app().oneshot(get("/admin/rules", Some("k"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rules = json(response).await;
        assert_eq!(rules[0]["method"], "PUT");
        assert_eq!(rules[0]["url"], "/a/.*");
    }

    #[tokio::test]
    async fn client_state_is_reported() {
        let response = app().oneshot(get("/admin/client", Some("k"))).await.unwrap();
        let status = json(response).await;
        assert_eq!(status["state"], "open");
        assert_eq!(status["pending_cycles"], 0);
    }
}
