use std::sync::Arc;

use crate::auth::IdentityResolver;
use crate::chat::{MessageRouter, RoutingSettings};
use crate::db::ChatStore;
use crate::ws::SharedRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator
    pub store: Arc<dyn ChatStore>,
    /// Resolves bearer and `?token=` credentials to a user id
    pub identity: Arc<dyn IdentityResolver>,
    /// Live sockets per user
    pub connections: SharedRegistry,
    pub routing: RoutingSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ChatStore>,
        identity: Arc<dyn IdentityResolver>,
        connections: SharedRegistry,
        routing: RoutingSettings,
    ) -> Self {
        Self {
            store,
            identity,
            connections,
            routing,
        }
    }

    pub fn message_router(&self) -> MessageRouter {
        MessageRouter::new(self.store.clone(), self.connections.clone(), self.routing)
    }
}
