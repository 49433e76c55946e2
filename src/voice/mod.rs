pub mod call;

use async_trait::async_trait;

use crate::{common::errors::TransportError, player::Ticket};

pub use call::SongbirdTransport;

/// Voice connection plus player for the one target channel.
///
/// Implementations report the end or failure of a stream started by
/// [`VoiceTransport::play`], and the loss of a connection made by
/// [`VoiceTransport::join`], back to the controller tagged with the ticket
/// passed in.
#[async_trait]
pub trait VoiceTransport: Send + 'static {
    type Input: Send + 'static;

    /// Joins the target channel. Reuses a live connection.
    async fn join(&mut self, ticket: Ticket) -> Result<(), TransportError>;

    /// Starts `input`, replacing whatever was playing.
    async fn play(&mut self, input: Self::Input, ticket: Ticket) -> Result<(), TransportError>;

    /// Stops the current stream, if any.
    async fn stop(&mut self);

    /// Disconnects. Not being connected is not an error.
    async fn leave(&mut self) -> Result<(), TransportError>;
}
