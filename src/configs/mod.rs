pub mod base;
pub mod discord;
pub mod logging;
pub mod player;
pub mod server;
pub mod sources;

pub use base::*;
pub use discord::*;
pub use logging::*;
pub use player::*;
pub use server::*;
pub use sources::*;
