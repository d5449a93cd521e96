//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Chat
        .route("/chat", post(handlers::chat::send_message))
        .route("/chat/history", get(handlers::chat::chat_history))
        // Sessions
        .route(
            "/sessions",
            get(handlers::session::list_sessions).post(handlers::session::create_session),
        )
        .route(
            "/sessions/{id}",
            get(handlers::session::get_session).delete(handlers::session::delete_session),
        )
        .route(
            "/sessions/{id}/personality-suggestion",
            get(handlers::session::get_suggestion)
                .post(handlers::session::apply_suggestion)
                .delete(handlers::session::dismiss_suggestion),
        )
        .route(
            "/sessions/{id}/proactive/ack",
            post(handlers::session::acknowledge_proactive),
        )
        // Agents
        .route(
            "/agents",
            get(handlers::agent::list_agents).post(handlers::agent::create_agent),
        )
        .route(
            "/agents/{id}",
            get(handlers::agent::get_agent)
                .patch(handlers::agent::patch_agent)
                .delete(handlers::agent::delete_agent),
        )
        .route(
            "/agents/{id}/personality",
            put(handlers::agent::update_personality),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no owner required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::state::tests::test_state;

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn get_as(owner: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("X-User-Id", owner)
            .body(Body::empty())
            .unwrap()
    }

    fn send_as(owner: &str, method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("X-User-Id", owner)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (status, json) = call(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_requires_owner() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let request = Request::post("/api/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(json!({"message": "hi"}).to_string()))
            .unwrap();
        let (status, json) = call(&app, request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["errors"][0]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_chat_starts_session_and_replies() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (status, json) = call(
            &app,
            send_as("alice", "POST", "/api/v1/chat", json!({"message": "Hello there"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert!(!data["response"].as_str().unwrap().is_empty());
        assert!(data["ai_message_id"].is_string());
        assert!(data["user_message_id"].is_string());
        assert!(json["meta"]["request_id"].is_string());

        let session_id = data["session_id"].as_str().unwrap().to_string();
        let (status, json) = call(&app, get_as("alice", &format!("/api/v1/sessions/{session_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["message_count"], 2);
        assert_eq!(json["data"]["messages"].as_array().unwrap().len(), 2);

        // Another owner cannot see the session.
        let (status, json) = call(&app, get_as("bob", &format!("/api/v1/sessions/{session_id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errors"][0]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (status, json) =
            call(&app, send_as("alice", "POST", "/api/v1/chat", json!({"message": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_invalid_session_id_is_bad_request() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (status, _) = call(&app, get_as("alice", "/api/v1/sessions/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_agent_lifecycle() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (status, json) = call(
            &app,
            send_as(
                "alice",
                "POST",
                "/api/v1/agents",
                json!({"name": "coach", "personality_prompt": "Upbeat and brief."}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let agent_id = json["data"]["id"].as_str().unwrap().to_string();

        let (status, json) = call(
            &app,
            send_as(
                "alice",
                "PUT",
                &format!("/api/v1/agents/{agent_id}/personality"),
                json!({"personality": "Calm and thorough."}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["personality_prompt"], "Calm and thorough.");

        let (_, json) = call(&app, get_as("alice", "/api/v1/agents")).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 1);

        let request = Request::delete(format!("/api/v1/agents/{agent_id}"))
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = call(&app, get_as("alice", &format!("/api/v1/agents/{agent_id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["errors"][0]["code"], "PERSONA_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_suggestion_endpoints_without_pending_suggestion() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (_, json) = call(&app, send_as("alice", "POST", "/api/v1/sessions", json!({}))).await;
        let session_id = json["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/sessions/{session_id}/personality-suggestion");

        let (status, json) = call(&app, get_as("alice", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"]["suggestion"].is_null());

        let (status, json) = call(&app, send_as("alice", "POST", &uri, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["applied"], false);

        let request = Request::delete(uri.as_str())
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let (_, json) = call(&app, request).await;
        assert_eq!(json["data"]["dismissed"], false);
    }

    #[tokio::test]
    async fn test_history_lists_sessions() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        call(&app, send_as("alice", "POST", "/api/v1/chat", json!({"message": "one"}))).await;
        call(&app, send_as("alice", "POST", "/api/v1/chat", json!({"message": "two"}))).await;

        let (status, json) = call(&app, get_as("alice", "/api/v1/chat/history?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
        let sessions = json["data"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["messages"].as_array().unwrap().len(), 2);
        assert_eq!(sessions[0]["messages"][0]["content"], "two");

        let (_, json) = call(&app, get_as("alice", "/api/v1/chat/history")).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 2);

        let unknown = format!("/api/v1/chat/history?session_id={}", uuid::Uuid::now_v7());
        let (status, json) = call(&app, get_as("alice", &unknown)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_list_carries_agent_name_and_preview() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (_, sent) =
            call(&app, send_as("alice", "POST", "/api/v1/chat", json!({"message": "Hello there"}))).await;

        let (status, json) = call(&app, get_as("alice", "/api/v1/sessions")).await;
        assert_eq!(status, StatusCode::OK);
        let listed = &json["data"][0];
        assert_eq!(listed["agent_name"], "default");
        assert_eq!(listed["summary"], sent["data"]["response"]);
        assert_eq!(listed["message_count"], 2);
    }

    #[tokio::test]
    async fn test_agent_patch() {
        let (state, _tmp) = test_state().await;
        let app = build_router(state);

        let (_, json) = call(
            &app,
            send_as("alice", "POST", "/api/v1/agents", json!({"name": "coach"})),
        )
        .await;
        let agent_id = json["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/agents/{agent_id}");

        let (status, json) = call(
            &app,
            send_as(
                "alice",
                "PATCH",
                &uri,
                json!({"timings": {"inactivity_threshold_minutes": 30}, "proactive_behavior": "conservative"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["timings"]["inactivity_threshold_minutes"], 30);
        assert_eq!(json["data"]["proactive_behavior"], "conservative");
        assert_eq!(json["data"]["name"], "coach");

        let (status, json) = call(&app, send_as("alice", "PATCH", &uri, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["code"], "VALIDATION_ERROR");

        let (status, _) = call(&app, send_as("bob", "PATCH", &uri, json!({"model": "gpt-4o-mini"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
