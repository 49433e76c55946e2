use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    common::errors::SourceError, gateway::presence::PresenceReading, player::state::Ticket,
};

/// Everything the controller reacts to. `I` is the playable stream type.
pub enum ControlEvent<I> {
    /// Membership of the target channel was recomputed.
    Presence(PresenceReading),
    /// A supply task finished.
    Supplied {
        ticket: Ticket,
        result: Result<I, SourceError>,
    },
    /// The player reached the end of the stream.
    TrackEnded(Ticket),
    /// The player gave up on the stream.
    TrackFailed { ticket: Ticket, reason: String },
    /// A scheduled retry delay elapsed.
    RetryDue(Ticket),
    /// The voice connection joined under this ticket's session dropped.
    ConnectionLost(Ticket),
}

impl<I> std::fmt::Debug for ControlEvent<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Presence(reading) => f.debug_tuple("Presence").field(reading).finish(),
            Self::Supplied { ticket, result } => f
                .debug_struct("Supplied")
                .field("ticket", ticket)
                .field("ok", &result.is_ok())
                .finish(),
            Self::TrackEnded(ticket) => f.debug_tuple("TrackEnded").field(ticket).finish(),
            Self::TrackFailed { ticket, reason } => f
                .debug_struct("TrackFailed")
                .field("ticket", ticket)
                .field("reason", reason)
                .finish(),
            Self::RetryDue(ticket) => f.debug_tuple("RetryDue").field(ticket).finish(),
            Self::ConnectionLost(ticket) => f.debug_tuple("ConnectionLost").field(ticket).finish(),
        }
    }
}

/// Cheap sending half of the controller mailbox.
pub struct ControllerHandle<I> {
    tx: mpsc::UnboundedSender<ControlEvent<I>>,
}

impl<I> Clone for ControllerHandle<I> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<I> ControllerHandle<I> {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlEvent<I>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the controller has stopped.
    pub fn send(&self, event: ControlEvent<I>) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                debug!("Controller gone, dropping {:?}", event);
                false
            }
        }
    }

    pub fn presence(&self, reading: PresenceReading) -> bool {
        self.send(ControlEvent::Presence(reading))
    }

    pub fn track_ended(&self, ticket: Ticket) -> bool {
        self.send(ControlEvent::TrackEnded(ticket))
    }

    pub fn track_failed(&self, ticket: Ticket, reason: impl Into<String>) -> bool {
        self.send(ControlEvent::TrackFailed {
            ticket,
            reason: reason.into(),
        })
    }

    pub fn connection_lost(&self, ticket: Ticket) -> bool {
        self.send(ControlEvent::ConnectionLost(ticket))
    }
}
