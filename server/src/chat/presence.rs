//! Presence tracking derived from the connection registry.
//!
//! A presence-check socket gets one status line when it opens. When it closes,
//! and the target was online at that moment, the target's own presence-check
//! socket is told the requester went away.

use chrono::Utc;
use std::sync::Arc;

use crate::db::models::UserId;
use crate::db::ChatStore;
use crate::ws::{ConnectionRegistry, SocketHandle, SocketKind};

/// Coarse presence: any live socket counts.
pub fn is_online(registry: &ConnectionRegistry, user_id: UserId) -> bool {
    registry.has_any_socket(user_id)
}

/// Wire form of a presence answer.
pub fn status_line(online: bool) -> &'static str {
    if online {
        "true"
    } else {
        "false"
    }
}

/// One presence-check handshake, from accept to close.
#[derive(Debug, Clone, Copy)]
pub struct PresenceCheck {
    requester: UserId,
    target: UserId,
    target_was_online: bool,
}

impl PresenceCheck {
    /// Read the target's state once and send it on the requester's socket.
    pub fn open(
        registry: &ConnectionRegistry,
        socket: &SocketHandle,
        requester: UserId,
        target: UserId,
    ) -> Self {
        let target_was_online = is_online(registry, target);
        socket.send_text(status_line(target_was_online));

        tracing::debug!(
            requester = %requester,
            target = %target,
            online = target_was_online,
            "Presence check opened"
        );

        Self {
            requester,
            target,
            target_was_online,
        }
    }

    /// Close out the handshake. Returns whether an offline notice went out.
    pub fn finish(self, registry: &ConnectionRegistry) -> bool {
        if !self.target_was_online {
            return false;
        }
        let sent = announce_offline(registry, self.target);
        tracing::debug!(
            requester = %self.requester,
            target = %self.target,
            sent,
            "Presence check closed"
        );
        sent
    }
}

/// Push `false` onto `user_id`'s presence-check socket. Dropped silently when
/// there is none.
pub fn announce_offline(registry: &ConnectionRegistry, user_id: UserId) -> bool {
    registry
        .lookup(user_id, SocketKind::Presence)
        .map(|socket| socket.send_text(status_line(false)))
        .unwrap_or(false)
}

/// Stamp `last_online` once the user's last socket is gone. Failures are
/// logged, never raised.
pub async fn record_last_online(store: Arc<dyn ChatStore>, user_id: UserId) {
    let now = Utc::now();
    let result = tokio::task::spawn_blocking(move || store.touch_last_online(user_id, now)).await;

    match result {
        Ok(Ok(())) => tracing::debug!(user_id = %user_id, "last_online updated"),
        Ok(Err(e)) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to update last_online")
        }
        Err(e) => tracing::warn!(user_id = %user_id, error = %e, "last_online task failed"),
    }
}
