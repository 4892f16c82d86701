//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Session
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/password", put(handlers::auth::change_password))
        .route(
            "/auth/security-question",
            post(handlers::auth::set_security_question),
        )
        .route(
            "/auth/recovery/:username",
            get(handlers::auth::security_question),
        )
        .route("/auth/recovery", post(handlers::auth::reset_password))
        // Users
        .route("/users", get(handlers::directory::list_users))
        .route("/users", post(handlers::directory::create_user))
        .route("/users/:id", get(handlers::directory::get_user))
        .route("/users/:id", put(handlers::directory::update_user))
        .route("/users/:id", delete(handlers::directory::delete_user))
        // Sectors
        .route("/sectors", get(handlers::directory::list_sectors))
        .route("/sectors", post(handlers::directory::create_sector))
        .route("/sectors/:id", put(handlers::directory::update_sector))
        .route("/sectors/:id", delete(handlers::directory::delete_sector))
        // Signatures
        .route("/signatures", get(handlers::signatures::list_signatures))
        .route("/signatures", post(handlers::signatures::create_signature))
        .route("/signatures/:id", get(handlers::signatures::get_signature))
        .route("/signatures/:id", put(handlers::signatures::update_signature))
        .route(
            "/signatures/:id",
            delete(handlers::signatures::delete_signature),
        )
        // Dropdown option feeds for the listing filters and creation form
        .route("/servers", get(handlers::signatures::list_servers))
        .route("/tokens", get(handlers::signatures::list_tokens))
        .route("/signatures/:id/can-edit", get(handlers::signatures::can_edit))
        .route("/signatures/:id/edit", post(handlers::signatures::apply_edit))
        .route(
            "/signatures/:id/attachments",
            get(handlers::signatures::list_attachments),
        )
        .route(
            "/signatures/:id/attachments",
            post(handlers::signatures::upload_attachment),
        )
        // Attachments
        .route(
            "/attachments/:id",
            get(handlers::signatures::download_attachment),
        )
        .route(
            "/attachments/:id",
            delete(handlers::signatures::delete_attachment),
        )
        // Requests
        .route("/requests", get(handlers::requests::list_requests))
        .route("/requests", post(handlers::requests::create_request))
        .route("/requests/:id", get(handlers::requests::get_request))
        .route(
            "/requests/:id/adjudicate",
            post(handlers::requests::adjudicate),
        )
        // Notifications
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/count",
            get(handlers::notifications::unread_count),
        )
        .route(
            "/notifications/read-all",
            put(handlers::notifications::mark_all_read),
        )
        .route(
            "/notifications/:id/read",
            put(handlers::notifications::mark_read),
        )
        .route(
            "/notifications/:id",
            delete(handlers::notifications::delete_notification),
        )
        // Chat
        .route("/chat/messages", post(handlers::chat::send_message))
        .route("/chat/inbox", get(handlers::chat::inbox))
        .route(
            "/chat/conversations",
            get(handlers::chat::list_conversations),
        )
        .route("/chat/conversations/:party", get(handlers::chat::conversation))
        .route("/chat/messages/:id/read", put(handlers::chat::mark_read))
        .route("/chat/guest", post(handlers::chat::guest_send))
        .route(
            "/chat/guest/:username",
            get(handlers::chat::guest_conversation),
        )
        // Admin exports
        .route("/admin/export/attachments", get(handlers::admin::export_attachments))
        .route("/admin/export/:table", get(handlers::admin::export_table));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sigdesk_identity::TokenSigner;
    use sigdesk_service::{seed_defaults, SigdeskService};
    use sigdesk_storage::{InMemoryObjectStore, InMemoryStorage};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let storage = Arc::new(InMemoryStorage::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let signer = TokenSigner::new("test-secret", chrono::Duration::hours(1));
        let service = Arc::new(SigdeskService::new(storage.clone(), objects, signer));
        seed_defaults(storage.as_ref(), "admin", "admin-initial")
            .await
            .unwrap();
        create_router(AppState::new(service), false)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_session() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_then_me() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"username":"admin","password":"admin-initial"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let login = body_json(response).await;
        assert_eq!(login["must_change_password"], true);
        let token = login["token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/auth/me")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me = body_json(response).await;
        assert_eq!(me["username"], "admin");
    }

    #[tokio::test]
    async fn bad_credentials_are_unauthorized() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"username":"admin","password":"wrong"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_tokens() {
        for uri in [
            "/api/v1/signatures",
            "/api/v1/requests",
            "/api/v1/notifications",
            "/api/v1/users",
            "/api/v1/servers",
            "/api/v1/tokens",
        ] {
            let response = app()
                .await
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn token_dropdown_lists_the_allowed_values() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/login")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"username":"admin","password":"admin-initial"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let login = body_json(response).await;
        let token = login["token"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tokens")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["tokens"], serde_json::json!(["Prefeito", "Municipio"]));
    }

    #[tokio::test]
    async fn guest_chat_needs_no_session() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/chat/guest")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"name":"Visitor","username":"visitor","text":"hello"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let message = body_json(response).await;
        assert_eq!(message["from"], "guest-visitor");
    }
}
