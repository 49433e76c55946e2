use serde::Serialize;
use tokio::task::JoinHandle;

use crate::gateway::presence::PresenceReading;

/// Lifecycle of the one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// No voice connection.
    Idle,
    /// Joined (or joining) and waiting for a stream.
    Connecting,
    /// A stream has been handed to the player.
    Playing,
}

/// Tags an asynchronous continuation with the session it belongs to.
///
/// `generation` changes on every teardown, `attempt` on every supply
/// invocation. A continuation carrying an old ticket is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Ticket {
    pub generation: u64,
    pub attempt: u64,
}

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}#{}", self.generation, self.attempt)
    }
}

/// Outcome of comparing a presence reading with the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    EnteredEmpty,
    EnteredNonEmpty,
    Unchanged,
}

/// Snapshot published to the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: Phase,
    pub connected: bool,
    pub playing: bool,
    pub present: bool,
    pub generation: u64,
}

/// Session state owned by the controller task. Never shared.
pub struct SessionState {
    phase: Phase,
    connected: bool,
    playing: bool,
    present: bool,
    generation: u64,
    attempt: u64,
    supply_in_flight: bool,
    retry: Option<JoinHandle<()>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            connected: false,
            playing: false,
            present: false,
            generation: 0,
            attempt: 0,
            supply_in_flight: false,
            retry: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn supply_in_flight(&self) -> bool {
        self.supply_in_flight
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            attempt: self.attempt,
        }
    }

    /// Whether `ticket` belongs to the latest supply of this session.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket == self.ticket()
    }

    /// Whether `ticket` was issued before the last teardown.
    pub fn is_stale_session(&self, ticket: Ticket) -> bool {
        ticket.generation != self.generation
    }

    /// Decides the edge from the session phase, not from a previous count.
    /// An unavailable reading never produces an edge.
    pub fn edge(&self, reading: &PresenceReading) -> PresenceEdge {
        match (reading, self.phase) {
            (PresenceReading::Unavailable(_), _) => PresenceEdge::Unchanged,
            (PresenceReading::Humans(n), Phase::Idle) if *n > 0 => PresenceEdge::EnteredNonEmpty,
            (PresenceReading::Humans(0), Phase::Connecting | Phase::Playing) => {
                PresenceEdge::EnteredEmpty
            }
            _ => PresenceEdge::Unchanged,
        }
    }

    pub fn observe(&mut self, reading: &PresenceReading) {
        self.present = reading.is_present();
    }

    pub fn begin_connecting(&mut self) {
        self.phase = Phase::Connecting;
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    /// The voice connection is gone or suspect; the next attempt rejoins.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.playing = false;
        if self.phase == Phase::Playing {
            self.phase = Phase::Connecting;
        }
    }

    /// Issues the ticket for a new supply invocation.
    pub fn next_attempt(&mut self) -> Ticket {
        self.attempt += 1;
        self.supply_in_flight = true;
        self.ticket()
    }

    pub fn supply_finished(&mut self) {
        self.supply_in_flight = false;
    }

    pub fn mark_playing(&mut self) {
        self.phase = Phase::Playing;
        self.playing = true;
    }

    pub fn mark_player_idle(&mut self) {
        self.playing = false;
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn set_retry(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.retry.replace(handle) {
            old.abort();
        }
    }

    pub fn clear_retry(&mut self) {
        self.retry = None;
    }

    /// Back to `Idle`: cancels the pending retry and invalidates every
    /// outstanding ticket.
    pub fn invalidate(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        self.connected = false;
        self.playing = false;
        self.supply_in_flight = false;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            connected: self.connected,
            playing: self.playing,
            present: self.present,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::PresenceUnavailable;

    #[test]
    fn edges_follow_phase() {
        let mut state = SessionState::new();
        assert_eq!(state.edge(&PresenceReading::Humans(0)), PresenceEdge::Unchanged);
        assert_eq!(
            state.edge(&PresenceReading::Humans(2)),
            PresenceEdge::EnteredNonEmpty
        );

        state.begin_connecting();
        assert_eq!(state.edge(&PresenceReading::Humans(3)), PresenceEdge::Unchanged);
        assert_eq!(
            state.edge(&PresenceReading::Humans(0)),
            PresenceEdge::EnteredEmpty
        );

        state.mark_playing();
        assert_eq!(
            state.edge(&PresenceReading::Humans(0)),
            PresenceEdge::EnteredEmpty
        );
    }

    #[test]
    fn unavailable_reading_never_transitions() {
        let mut state = SessionState::new();
        let reading = PresenceReading::Unavailable(PresenceUnavailable::GuildNotCached(1));
        assert_eq!(state.edge(&reading), PresenceEdge::Unchanged);

        state.begin_connecting();
        assert_eq!(state.edge(&reading), PresenceEdge::Unchanged);

        state.observe(&reading);
        assert!(!state.is_present());
    }

    #[test]
    fn invalidate_makes_old_tickets_stale() {
        let mut state = SessionState::new();
        state.begin_connecting();
        let ticket = state.next_attempt();
        assert!(state.is_current(ticket));
        assert!(state.supply_in_flight());

        state.invalidate();
        assert!(!state.is_current(ticket));
        assert!(state.is_stale_session(ticket));
        assert_eq!(state.phase(), Phase::Idle);
        assert!(!state.supply_in_flight());
    }

    #[test]
    fn disconnect_falls_back_to_connecting() {
        let mut state = SessionState::new();
        state.begin_connecting();
        state.mark_connected();
        state.mark_playing();

        state.mark_disconnected();
        assert_eq!(state.phase(), Phase::Connecting);
        assert!(!state.is_connected());
        assert!(!state.is_playing());

        state.invalidate();
        state.mark_disconnected();
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn new_attempt_supersedes_previous_ticket() {
        let mut state = SessionState::new();
        let first = state.next_attempt();
        let second = state.next_attempt();
        assert!(!state.is_current(first));
        assert!(!state.is_stale_session(first));
        assert!(state.is_current(second));
    }
}
