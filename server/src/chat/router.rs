//! Message routing for chat sockets.
//!
//! One inbound event is handled in strict order: decode and validate it,
//! resolve the chat for the pair, persist the message, then pick exactly one
//! delivery path. Nothing is sent for an event whose persistence failed.

use chrono::Utc;
use std::sync::Arc;

use super::envelope::{to_frame, ChatEnvelope, InboundChatEvent, NotificationEnvelope};
use crate::config::{ChatPayload, Config};
use crate::db::models::{ChatRoom, Message, User, UserId};
use crate::db::ChatStore;
use crate::error::{RejectReason, RouteError, StoreError};
use crate::ws::{SharedRegistry, SocketKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingSettings {
    pub payload: ChatPayload,
    pub max_message_length: usize,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            payload: ChatPayload::Json,
            max_message_length: 4000,
        }
    }
}

impl From<&Config> for RoutingSettings {
    fn from(config: &Config) -> Self {
        Self {
            payload: config.chat_payload,
            max_message_length: config.max_message_length,
        }
    }
}

/// Which path a persisted message took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Receiver's chat socket is open for this sender.
    Direct,
    /// Receiver only had a notification socket.
    Notification,
    /// No live socket; the message waits in storage.
    Stored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub chat: ChatRoom,
    pub message: Message,
    pub delivery: Delivery,
}

#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn ChatStore>,
    registry: SharedRegistry,
    settings: RoutingSettings,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ChatStore>,
        registry: SharedRegistry,
        settings: RoutingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Handle one text frame received on `sender`'s chat socket.
    pub async fn route(&self, sender: &User, raw: &str) -> Result<Routed, RouteError> {
        let received_at = Utc::now();
        let event = InboundChatEvent::parse(raw)?;
        self.validate(sender.id, &event)?;

        let receiver_id = event.receiver_id;
        let (chat, message) = self.persist(sender.id, event, received_at).await?;

        let delivery = self.deliver(sender, receiver_id, &chat, &message);

        tracing::debug!(
            sender_id = %sender.id,
            receiver_id = %receiver_id,
            chat_id = %chat.id,
            message_id = message.id,
            delivery = ?delivery,
            "Message routed"
        );

        Ok(Routed {
            chat,
            message,
            delivery,
        })
    }

    fn validate(&self, sender_id: UserId, event: &InboundChatEvent) -> Result<(), RejectReason> {
        if event.sender_id != sender_id {
            return Err(RejectReason::SenderMismatch);
        }
        if event.receiver_id == sender_id {
            return Err(RejectReason::SelfMessage);
        }
        if event.message.trim().is_empty() {
            return Err(RejectReason::EmptyMessage);
        }
        let max = self.settings.max_message_length;
        if event.message.chars().count() > max {
            return Err(RejectReason::TooLong { max });
        }
        Ok(())
    }

    async fn persist(
        &self,
        sender_id: UserId,
        event: InboundChatEvent,
        received_at: chrono::DateTime<Utc>,
    ) -> Result<(ChatRoom, Message), RouteError> {
        let store = self.store.clone();
        let receiver_id = event.receiver_id;

        let persisted = tokio::task::spawn_blocking(move || {
            let chat = store.find_or_create_chat(sender_id, receiver_id)?;
            let message =
                store.save_message(chat.id, sender_id, &event.message, false, received_at)?;
            Ok::<_, StoreError>((chat, message))
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;

        persisted.map_err(|e| match e {
            StoreError::UnknownUser(id) if id == receiver_id => {
                RouteError::Rejected(RejectReason::UnknownReceiver(id))
            }
            other => RouteError::Store(other),
        })
    }

    /// Pick one delivery path and push the payload. Sends are best effort: a
    /// socket that closed in the meantime just drops the frame.
    fn deliver(
        &self,
        sender: &User,
        receiver_id: UserId,
        chat: &ChatRoom,
        message: &Message,
    ) -> Delivery {
        if let Some(socket) = self.registry.peer_chat_socket(receiver_id, sender.id) {
            let frame = match self.settings.payload {
                ChatPayload::Json => to_frame(&ChatEnvelope {
                    message: &message.text,
                    receiver_id,
                    sender_id: sender.id,
                }),
                ChatPayload::Text => message.text.clone(),
            };
            if !socket.send_text(frame) {
                tracing::debug!(receiver_id = %receiver_id, "Chat socket gone, frame dropped");
            }
            return Delivery::Direct;
        }

        if let Some(socket) = self.registry.lookup(receiver_id, SocketKind::Notification) {
            let frame = to_frame(&NotificationEnvelope {
                message: &message.text,
                chat_id: chat.id,
                sender_id: sender.id,
                sender_username: &sender.username,
                receiver_id,
            });
            if !socket.send_text(frame) {
                tracing::debug!(
                    receiver_id = %receiver_id,
                    "Notification socket gone, frame dropped"
                );
            }
            return Delivery::Notification;
        }

        Delivery::Stored
    }
}
