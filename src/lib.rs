pub mod common;
pub mod configs;
pub mod gateway;
pub mod player;
pub mod sources;
pub mod transport;
pub mod voice;
