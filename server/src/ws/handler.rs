use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::db::models::{User, UserId};
use crate::error::AuthError;
use crate::state::AppState;
use crate::ws::session::Session;
use crate::ws::{actor, close_code, SocketKind};

/// Query parameters for WebSocket connection.
/// Browsers cannot set headers on a WebSocket handshake, so the credential
/// travels as `?token=`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

/// Why a socket is closed right after the upgrade.
#[derive(Debug, Clone, Copy)]
struct Refusal {
    code: u16,
    reason: &'static str,
}

impl From<AuthError> for Refusal {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => Refusal {
                code: close_code::TOKEN_EXPIRED,
                reason: "Token expired",
            },
            AuthError::Invalid => Refusal {
                code: close_code::TOKEN_INVALID,
                reason: "Token invalid",
            },
        }
    }
}

/// Upgrade the connection, then immediately close with the refusal's code.
fn refuse(ws: WebSocketUpgrade, refusal: Refusal) -> Response {
    tracing::warn!(
        close_code = refusal.code,
        reason = refusal.reason,
        "WebSocket refused"
    );
    ws.on_upgrade(move |mut socket| async move {
        let close_frame = CloseFrame {
            code: refusal.code,
            reason: refusal.reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}

async fn load_user(state: &AppState, id: UserId, reason: &'static str) -> Result<User, Refusal> {
    let store = state.store.clone();
    let found = tokio::task::spawn_blocking(move || store.get_user_by_id(id)).await;

    match found {
        Ok(Ok(Some(user))) => Ok(user),
        Ok(Ok(None)) => Err(Refusal {
            code: close_code::UNKNOWN_USER,
            reason,
        }),
        Ok(Err(e)) => {
            tracing::error!(user_id = %id, error = %e, "User lookup failed");
            Err(Refusal {
                code: close_code::INTERNAL_ERROR,
                reason: "Internal error",
            })
        }
        Err(e) => {
            tracing::error!(user_id = %id, error = %e, "User lookup task failed");
            Err(Refusal {
                code: close_code::INTERNAL_ERROR,
                reason: "Internal error",
            })
        }
    }
}

/// Resolve the credential and load the caller.
async fn authenticate(state: &AppState, token: &str) -> Result<User, Refusal> {
    let user_id = state.identity.resolve_current_user(token)?;
    load_user(state, user_id, "Unknown user").await
}

/// GET /ws/chat/{peer_id}?token=JWT
pub async fn chat_upgrade(
    State(state): State<AppState>,
    Path(peer_id): Path<i64>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match authenticate(&state, &params.token).await {
        Ok(user) => user,
        Err(refusal) => return refuse(ws, refusal),
    };
    let peer = match load_user(&state, UserId(peer_id), "Unknown peer").await {
        Ok(peer) => peer.id,
        Err(refusal) => return refuse(ws, refusal),
    };

    tracing::info!(user_id = %user.id, peer_id = %peer, "Chat socket authenticated");
    ws.on_upgrade(move |socket| async move {
        let session = Session::accept(socket, user.id, SocketKind::Chat, Some(peer));
        actor::run_chat(session, state, user, peer).await;
    })
}

/// GET /ws/presence/{target_id}?token=JWT
pub async fn presence_upgrade(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match authenticate(&state, &params.token).await {
        Ok(user) => user,
        Err(refusal) => return refuse(ws, refusal),
    };
    let target = match load_user(&state, UserId(target_id), "Unknown target").await {
        Ok(target) => target.id,
        Err(refusal) => return refuse(ws, refusal),
    };

    tracing::info!(user_id = %user.id, target_id = %target, "Presence socket authenticated");
    ws.on_upgrade(move |socket| async move {
        let session = Session::accept(socket, user.id, SocketKind::Presence, None);
        actor::run_presence(session, state, target).await;
    })
}

/// GET /ws/notifications?token=JWT
pub async fn notification_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match authenticate(&state, &params.token).await {
        Ok(user) => user,
        Err(refusal) => return refuse(ws, refusal),
    };

    tracing::info!(user_id = %user.id, "Notification socket authenticated");
    ws.on_upgrade(move |socket| async move {
        let session = Session::accept(socket, user.id, SocketKind::Notification, None);
        actor::run_notification(session, state).await;
    })
}
