//! Process-wide table of live sockets, one typed entry per user.
//!
//! Each user holds at most one socket per kind. The table is a sharded map, so
//! a register/unregister only locks the shard owning that user, and every read
//! clones the handle out before the caller writes to the socket.

use axum::extract::ws::{CloseFrame, Message};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::models::UserId;

/// Sender half of a socket's outbound queue; the session's writer task drains it.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Unique id of one accepted socket.
pub type SocketId = Uuid;

/// Logical channel multiplexed per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Chat,
    Presence,
    Notification,
}

impl SocketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Presence => "presence",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cheap, cloneable handle to one live socket.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    id: SocketId,
    /// Peer this socket was opened for (chat sockets only).
    peer: Option<UserId>,
    tx: ConnectionSender,
}

impl SocketHandle {
    pub fn new(tx: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            peer: None,
            tx,
        }
    }

    pub fn with_peer(mut self, peer: UserId) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn peer(&self) -> Option<UserId> {
        self.peer
    }

    /// Queue a frame. Returns false once the socket's writer is gone.
    pub fn send(&self, msg: Message) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Message::Text(text.into().into()))
    }

    /// Queue a close frame; the writer flushes it and stops.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
    }
}

/// Per-user record: zero or one socket for each kind.
#[derive(Debug, Clone, Default)]
pub struct ConnectionEntry {
    pub chat: Option<SocketHandle>,
    pub presence: Option<SocketHandle>,
    pub notification: Option<SocketHandle>,
}

impl ConnectionEntry {
    pub fn is_empty(&self) -> bool {
        self.chat.is_none() && self.presence.is_none() && self.notification.is_none()
    }

    fn slot(&self, kind: SocketKind) -> &Option<SocketHandle> {
        match kind {
            SocketKind::Chat => &self.chat,
            SocketKind::Presence => &self.presence,
            SocketKind::Notification => &self.notification,
        }
    }

    fn slot_mut(&mut self, kind: SocketKind) -> &mut Option<SocketHandle> {
        match kind {
            SocketKind::Chat => &mut self.chat,
            SocketKind::Presence => &mut self.presence,
            SocketKind::Notification => &mut self.notification,
        }
    }
}

/// Outcome of [`ConnectionRegistry::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The slot holds another socket or nothing; left untouched.
    NotHeld,
    /// Cleared; the user still holds sockets of other kinds.
    Cleared,
    /// Cleared, and it was the user's last socket.
    LastSocket,
}

/// Connection registry shared by every session task.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<UserId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Install `socket` in the user's `kind` slot, allocating the entry if absent.
    ///
    /// A socket already in that slot is replaced and handed back. It is NOT
    /// closed here; the caller owns closing it.
    pub fn register(
        &self,
        user_id: UserId,
        kind: SocketKind,
        socket: SocketHandle,
    ) -> Option<SocketHandle> {
        let socket_id = socket.id();
        let displaced = self
            .entries
            .entry(user_id)
            .or_default()
            .slot_mut(kind)
            .replace(socket);

        tracing::debug!(
            user_id = %user_id,
            kind = %kind,
            socket_id = %socket_id,
            replaced = displaced.is_some(),
            "Socket registered"
        );
        displaced
    }

    /// Clear the user's `kind` slot unconditionally. Idempotent: clearing an
    /// empty slot (or an unknown user) is a no-op that returns `None`.
    pub fn unregister(&self, user_id: UserId, kind: SocketKind) -> Option<SocketHandle> {
        self.clear_slot(user_id, kind, |_| true).0
    }

    /// Clear the user's `kind` slot only if it still holds `socket_id`.
    ///
    /// A closing session calls this so that a socket which was replaced does
    /// not clear its replacement. Whether this was the user's last socket is
    /// decided under the same entry lock as the removal.
    pub fn release(&self, user_id: UserId, kind: SocketKind, socket_id: SocketId) -> Release {
        match self.clear_slot(user_id, kind, |h| h.id() == socket_id) {
            (None, _) => Release::NotHeld,
            (Some(_), false) => Release::Cleared,
            (Some(_), true) => Release::LastSocket,
        }
    }

    fn clear_slot(
        &self,
        user_id: UserId,
        kind: SocketKind,
        matches: impl FnOnce(&SocketHandle) -> bool,
    ) -> (Option<SocketHandle>, bool) {
        // The entry guard holds the shard lock, so the check, the take and the
        // removal of an emptied entry are one atomic step.
        let Entry::Occupied(mut occupied) = self.entries.entry(user_id) else {
            return (None, false);
        };

        let slot = occupied.get_mut().slot_mut(kind);
        let removed = if slot.as_ref().is_some_and(matches) {
            slot.take()
        } else {
            None
        };

        let entry_removed = occupied.get().is_empty();
        if entry_removed {
            occupied.remove();
        }

        if let Some(handle) = &removed {
            tracing::debug!(
                user_id = %user_id,
                kind = %kind,
                socket_id = %handle.id(),
                "Socket unregistered"
            );
        }
        (removed, entry_removed)
    }

    /// Pure read of one slot.
    pub fn lookup(&self, user_id: UserId, kind: SocketKind) -> Option<SocketHandle> {
        self.entries
            .get(&user_id)
            .and_then(|entry| entry.slot(kind).clone())
    }

    /// The user's chat socket, but only if it was opened for `peer`.
    pub fn peer_chat_socket(&self, user_id: UserId, peer: UserId) -> Option<SocketHandle> {
        self.lookup(user_id, SocketKind::Chat)
            .filter(|handle| handle.peer() == Some(peer))
    }

    /// Coarse presence: the user has a socket of any kind.
    pub fn has_any_socket(&self, user_id: UserId) -> bool {
        self.entries
            .get(&user_id)
            .map(|entry| !entry.is_empty())
            .unwrap_or(false)
    }

    /// Routing predicate: the user is chatting with exactly `peer` right now.
    pub fn has_peer_chat_socket(&self, user_id: UserId, peer: UserId) -> bool {
        self.peer_chat_socket(user_id, peer).is_some()
    }

    /// Number of users with at least one socket.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
