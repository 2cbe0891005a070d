use axum::{routing::get, routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::chat::{contacts, history};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoints (auth via query param, not bearer header)
    let ws_routes = Router::new()
        .route("/ws/chat/{peer_id}", get(ws_handler::chat_upgrade))
        .route("/ws/presence/{target_id}", get(ws_handler::presence_upgrade))
        .route("/ws/notifications", get(ws_handler::notification_upgrade));

    // Chat history (CurrentUser extractor validates the bearer token)
    let chat_routes = Router::new()
        .route("/api/chats", get(history::list_chats))
        .route("/api/chats/{chat_id}/messages", get(history::chat_messages))
        .route("/api/chats/{chat_id}/seen", post(history::mark_seen))
        .route("/api/contacts", get(contacts::list_contacts))
        .route("/api/contacts/{user_id}", post(contacts::add_contact));

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(chat_routes)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
