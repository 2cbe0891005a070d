pub mod contacts;
pub mod envelope;
pub mod history;
pub mod presence;
pub mod router;

pub use router::{Delivery, MessageRouter, Routed, RoutingSettings};
