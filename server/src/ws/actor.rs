use crate::chat::envelope::{to_frame, ErrorFrame};
use crate::chat::presence::{self, PresenceCheck};
use crate::db::models::{User, UserId};
use crate::error::{RejectReason, RouteError};
use crate::state::AppState;
use crate::ws::{close_code, Release};
use crate::ws::session::{Inbound, Session};

/// Install the session's socket and close whatever it displaced.
fn register(state: &AppState, session: &Session) {
    let displaced = state.connections.register(
        session.user_id(),
        session.kind(),
        session.handle().clone(),
    );

    if let Some(old) = displaced {
        tracing::info!(
            user_id = %session.user_id(),
            kind = %session.kind(),
            socket_id = %old.id(),
            "Closing replaced socket"
        );
        old.close(close_code::REPLACED, "replaced");
    }

    tracing::debug!(
        user_id = %session.user_id(),
        kind = %session.kind(),
        online = state.connections.len(),
        "Session registered"
    );
}

/// Release the session's slot. If that was the user's last socket, stamp
/// `last_online`.
async fn release(state: &AppState, session: &Session) {
    let user_id = session.user_id();
    let released = state
        .connections
        .release(user_id, session.kind(), session.handle().id());

    if released == Release::LastSocket {
        presence::record_last_online(state.store.clone(), user_id).await;
    }
}

fn send_rejection(session: &Session, reason: &RejectReason) {
    tracing::debug!(
        user_id = %session.user_id(),
        reason = %reason,
        "Chat event rejected"
    );
    session.handle().send_text(to_frame(&ErrorFrame::from(reason)));
}

/// Chat socket for `user` talking to `peer`. Every text frame goes through the
/// message router; a persistence failure ends the session with 1011.
pub async fn run_chat(mut session: Session, state: AppState, user: User, peer: UserId) {
    register(&state, &session);
    let router = state.message_router();

    tracing::info!(user_id = %user.id, peer_id = %peer, "Chat actor started");

    let mut persistence_failed = false;
    while let Some(frame) = session.next_frame().await {
        let raw = match frame {
            Inbound::Text(raw) => raw,
            Inbound::Binary => {
                send_rejection(&session, &RejectReason::Binary);
                continue;
            }
        };

        match router.route(&user, &raw).await {
            Ok(_) => {}
            Err(RouteError::Rejected(reason)) => send_rejection(&session, &reason),
            Err(RouteError::Store(e)) => {
                tracing::error!(
                    user_id = %user.id,
                    peer_id = %peer,
                    error = %e,
                    "Persistence failed, closing chat socket"
                );
                persistence_failed = true;
                break;
            }
        }
    }

    release(&state, &session).await;

    if persistence_failed {
        session
            .shutdown(close_code::INTERNAL_ERROR, "persistence failure")
            .await;
    } else {
        session.finish().await;
    }

    tracing::info!(user_id = %user.id, peer_id = %peer, "Chat actor stopped");
}

/// Presence-check socket: one status line for `target`, then drain until close.
pub async fn run_presence(mut session: Session, state: AppState, target: UserId) {
    register(&state, &session);
    let requester = session.user_id();

    let check = PresenceCheck::open(&state.connections, session.handle(), requester, target);

    // Inbound frames on this socket carry no meaning
    while session.next_frame().await.is_some() {}

    release(&state, &session).await;
    check.finish(&state.connections);
    session.finish().await;
}

/// Notification socket: server push only, inbound is ignored.
pub async fn run_notification(mut session: Session, state: AppState) {
    register(&state, &session);

    while session.next_frame().await.is_some() {}

    release(&state, &session).await;
    session.finish().await;
}
