pub mod controller;
pub mod events;
pub mod recovery;
pub mod state;

pub use controller::Controller;
pub use events::{ControlEvent, ControllerHandle};
pub use recovery::Recovery;
pub use state::*;
