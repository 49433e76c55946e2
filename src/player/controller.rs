use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    common::errors::SourceError,
    gateway::presence::PresenceReading,
    player::{
        events::{ControlEvent, ControllerHandle},
        recovery::{AfterEnd, AfterFailure, Recovery},
        state::{Phase, PresenceEdge, SessionState, SessionStatus, Ticket},
    },
    sources::StreamSupplier,
    voice::VoiceTransport,
};

/// Owns the playback session and applies every event to it in arrival order.
///
/// Supply tasks, player callbacks and retry timers only ever talk to the
/// controller through its mailbox, so no session state is shared.
pub struct Controller<S, V>
where
    S: StreamSupplier,
    V: VoiceTransport<Input = S::Output>,
{
    supplier: Arc<S>,
    transport: V,
    session: SessionState,
    recovery: Recovery,
    notifier: ControllerHandle<S::Output>,
    events: mpsc::UnboundedReceiver<ControlEvent<S::Output>>,
    status: watch::Sender<SessionStatus>,
}

impl<S, V> Controller<S, V>
where
    S: StreamSupplier,
    V: VoiceTransport<Input = S::Output>,
{
    pub fn new(
        supplier: Arc<S>,
        transport: V,
        recovery: Recovery,
        notifier: ControllerHandle<S::Output>,
        events: mpsc::UnboundedReceiver<ControlEvent<S::Output>>,
    ) -> Self {
        let session = SessionState::new();
        let (status, _) = watch::channel(session.status());
        Self {
            supplier,
            transport,
            session,
            recovery,
            notifier,
            events,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Playback controller started (retry delay {:?})",
            self.recovery.delay()
        );

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events.recv() => event,
            };

            match event {
                None => break,
                Some(event) => self.dispatch(event).await,
            }
        }

        if self.session.phase() != Phase::Idle {
            self.teardown().await;
            self.publish();
        }
        info!("Playback controller stopped");
    }

    async fn dispatch(&mut self, event: ControlEvent<S::Output>) {
        match event {
            ControlEvent::Presence(reading) => self.on_presence(reading).await,
            ControlEvent::Supplied { ticket, result } => self.on_supplied(ticket, result).await,
            ControlEvent::TrackEnded(ticket) => self.on_track_ended(ticket).await,
            ControlEvent::TrackFailed { ticket, reason } => {
                self.on_track_failed(ticket, reason).await
            }
            ControlEvent::RetryDue(ticket) => self.on_retry_due(ticket).await,
            ControlEvent::ConnectionLost(ticket) => self.on_connection_lost(ticket).await,
        }
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(self.session.status());
    }

    async fn on_presence(&mut self, reading: PresenceReading) {
        if let PresenceReading::Unavailable(reason) = &reading {
            warn!("Cannot read channel membership: {}", reason);
        }

        let edge = self.session.edge(&reading);
        self.session.observe(&reading);

        match edge {
            PresenceEdge::EnteredNonEmpty => {
                info!("Listeners arrived, starting the radio");
                self.session.begin_connecting();
                self.connect_and_supply().await;
            }
            PresenceEdge::EnteredEmpty => {
                info!("Channel is empty, stopping the radio");
                self.teardown().await;
            }
            PresenceEdge::Unchanged => {}
        }
    }

    async fn connect_and_supply(&mut self) {
        if !self.session.is_connected() {
            if let Err(e) = self.transport.join(self.session.ticket()).await {
                warn!("Voice join failed: {}", e);
                self.on_failure().await;
                return;
            }
            self.session.mark_connected();
        }
        self.start_supply();
    }

    /// At most one supply runs at a time.
    fn start_supply(&mut self) {
        if self.session.supply_in_flight() {
            debug!("Supply already in flight, not starting another");
            return;
        }

        let ticket = self.session.next_attempt();
        let supplier = Arc::clone(&self.supplier);
        let notifier = self.notifier.clone();
        debug!("Requesting stream {}", ticket);

        tokio::spawn(async move {
            let result = supplier.supply().await;
            notifier.send(ControlEvent::Supplied { ticket, result });
        });
    }

    async fn on_supplied(&mut self, ticket: Ticket, result: Result<S::Output, SourceError>) {
        if !self.session.is_current(ticket) {
            // Dropping the stream closes it.
            debug!("Discarding stale stream {}", ticket);
            return;
        }
        self.session.supply_finished();

        if !self.session.is_present() {
            info!("Nobody left to listen, discarding stream {}", ticket);
            self.teardown().await;
            return;
        }

        match result {
            Ok(_) if !self.session.is_connected() => {
                info!("Voice connection lost while fetching {}, rejoining", ticket);
                self.on_failure().await;
            }
            Ok(stream) => match self.transport.play(stream, ticket).await {
                Ok(()) => self.session.mark_playing(),
                Err(e) => {
                    warn!("Failed to start stream {}: {}", ticket, e);
                    self.session.mark_disconnected();
                    self.on_failure().await;
                }
            },
            Err(e) => {
                warn!("Stream source failed ({}): {}", ticket, e);
                self.on_failure().await;
            }
        }
    }

    async fn on_track_ended(&mut self, ticket: Ticket) {
        if !self.session.is_current(ticket) || !self.session.is_playing() {
            debug!("Ignoring end of inactive stream {}", ticket);
            return;
        }
        self.session.mark_player_idle();

        match self.recovery.after_end(self.session.is_present()) {
            AfterEnd::Replay => {
                info!("Stream {} ended, reconnecting", ticket);
                self.start_supply();
            }
            AfterEnd::Teardown => self.teardown().await,
        }
    }

    async fn on_track_failed(&mut self, ticket: Ticket, reason: String) {
        if !self.session.is_current(ticket) || !self.session.is_playing() {
            debug!("Ignoring failure of inactive stream {}: {}", ticket, reason);
            return;
        }
        warn!("Player error on {}: {}", ticket, reason);
        // The connection may be what broke; rejoining a live call is a no-op.
        self.session.mark_disconnected();
        self.on_failure().await;
    }

    async fn on_connection_lost(&mut self, ticket: Ticket) {
        if self.session.is_stale_session(ticket) || !self.session.is_connected() {
            debug!("Ignoring disconnect of inactive connection {}", ticket);
            return;
        }
        warn!("Voice connection lost");
        self.session.mark_disconnected();
        self.transport.stop().await;
        self.on_failure().await;
    }

    async fn on_failure(&mut self) {
        match self.recovery.after_failure(self.session.is_present()) {
            AfterFailure::RetryLater => {
                if self.session.retry_pending() {
                    debug!("Retry already scheduled");
                    return;
                }
                let ticket = self.session.ticket();
                info!("Retrying in {:?}", self.recovery.delay());
                let timer = self.recovery.schedule(ticket, self.notifier.clone());
                self.session.set_retry(timer);
            }
            AfterFailure::Teardown => self.teardown().await,
        }
    }

    async fn on_retry_due(&mut self, ticket: Ticket) {
        if self.session.is_stale_session(ticket) {
            debug!("Ignoring retry {} from an earlier session", ticket);
            return;
        }
        self.session.clear_retry();

        if !self.session.is_present() {
            if self.session.phase() != Phase::Idle {
                info!("No listeners at retry time, stopping");
                self.teardown().await;
            }
            return;
        }

        if self.session.supply_in_flight() || self.session.is_playing() {
            debug!("Retry {} superseded", ticket);
            return;
        }

        info!("Retrying playback");
        self.connect_and_supply().await;
    }

    /// Cleanup only: cancels the retry, stops the player and disconnects.
    async fn teardown(&mut self) {
        self.session.invalidate();
        self.transport.stop().await;
        if let Err(e) = self.transport.leave().await {
            warn!("Failed to leave voice channel: {}", e);
        }
        debug!("Session torn down, now generation {}", self.session.generation());
    }
}
