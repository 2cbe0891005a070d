pub mod actor;
pub mod handler;
pub mod registry;
pub mod session;

use std::sync::Arc;

pub use registry::{
    ConnectionEntry, ConnectionRegistry, ConnectionSender, Release, SocketHandle, SocketId,
    SocketKind,
};

/// Close codes sent to clients, in addition to the standard 1000/1011.
pub mod close_code {
    /// The same user opened another socket of the same kind.
    pub const REPLACED: u16 = 4000;
    pub const TOKEN_EXPIRED: u16 = 4001;
    pub const TOKEN_INVALID: u16 = 4002;
    /// Token was valid but the user or path target does not exist.
    pub const UNKNOWN_USER: u16 = 4004;
    pub const NORMAL: u16 = 1000;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Connection registry shared across every handler and session task.
pub type SharedRegistry = Arc<ConnectionRegistry>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> SharedRegistry {
    Arc::new(ConnectionRegistry::new())
}
