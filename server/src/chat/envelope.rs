//! JSON payloads carried over chat and notification sockets.

use serde::{Deserialize, Deserializer, Serialize};

use crate::db::models::{ChatId, UserId};
use crate::error::RejectReason;

/// What a client sends on its chat socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundChatEvent {
    pub message: String,
    #[serde(deserialize_with = "lenient_user_id")]
    pub receiver_id: UserId,
    #[serde(deserialize_with = "lenient_user_id")]
    pub sender_id: UserId,
}

impl InboundChatEvent {
    pub fn parse(raw: &str) -> Result<Self, RejectReason> {
        serde_json::from_str(raw).map_err(|e| RejectReason::Malformed(e.to_string()))
    }
}

/// Browsers often send ids as strings; accept `7` and `"7"` alike.
fn lenient_user_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Str(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(UserId(id)),
        RawId::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| serde::de::Error::custom(format!("invalid user id {s:?}"))),
    }
}

/// Pushed onto the receiver's chat socket when it is open for the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEnvelope<'a> {
    pub message: &'a str,
    pub receiver_id: UserId,
    pub sender_id: UserId,
}

/// Pushed onto the receiver's notification socket otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEnvelope<'a> {
    pub message: &'a str,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub sender_username: &'a str,
    pub receiver_id: UserId,
}

/// Sent back to the sender when one event is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFrame {
    pub error: String,
}

impl From<&RejectReason> for ErrorFrame {
    fn from(reason: &RejectReason) -> Self {
        Self {
            error: reason.to_string(),
        }
    }
}

/// Serialize a payload for a text frame.
pub fn to_frame<T: Serialize>(payload: &T) -> String {
    // Envelopes are plain structs of strings and integers
    serde_json::to_string(payload).unwrap_or_default()
}
