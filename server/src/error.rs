//! Error types for the persistence, identity and routing layers.

use thiserror::Error;

use crate::db::models::{ChatId, UserId};

/// Failures raised by the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {0} does not exist")]
    UnknownUser(UserId),

    #[error("chat {0} does not exist")]
    UnknownChat(ChatId),

    #[error("expected two distinct users, got {0} twice")]
    SameUser(UserId),

    #[error("user {0} is already a contact")]
    DuplicateContact(UserId),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures raised by the identity collaborator.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential expired")]
    Expired,

    #[error("credential invalid")]
    Invalid,
}

/// Why a single inbound chat event was refused. The socket stays open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("malformed event: {0}")]
    Malformed(String),

    #[error("binary frames are not accepted")]
    Binary,

    #[error("sender_id does not match the connected user")]
    SenderMismatch,

    #[error("cannot send a message to yourself")]
    SelfMessage,

    #[error("message is empty")]
    EmptyMessage,

    #[error("message exceeds {max} characters")]
    TooLong { max: usize },

    #[error("receiver {0} does not exist")]
    UnknownReceiver(UserId),
}

/// Outcome of a failed routing attempt.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The event was refused; keep the socket.
    #[error(transparent)]
    Rejected(#[from] RejectReason),

    /// Persistence failed; the chat socket must be closed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fatal startup failures surfaced from `main`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration: {0}")]
    Config(#[from] figment::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
