//! Discord gateway side: who is in the channel.

pub mod handler;
pub mod presence;

pub use handler::GatewayHandler;
pub use presence::{PresenceReading, observe};
