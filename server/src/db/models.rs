//! Row types for the persistence collaborator.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user identifier, owned by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User record in the users table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub last_online: Option<DateTime<Utc>>,
    pub join_date: DateTime<Utc>,
}

/// A conversation between exactly two users.
/// Participants are stored normalized: `user_a < user_b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRoom {
    pub id: ChatId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    pub fn includes(&self, user_id: UserId) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }
}

/// Persisted chat message. Only `seen` ever changes, and only false -> true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub seen: bool,
}

/// A chat as seen from one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub target_user_id: UserId,
    pub target_username: String,
}

/// Another user in someone's contact list, with their presence stamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    pub id: UserId,
    pub username: String,
    pub last_online: Option<DateTime<Utc>>,
}

/// Order a pair so that the smaller id comes first.
pub fn normalize_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
