use std::sync::Arc;

use async_trait::async_trait;
use songbird::{
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
    error::JoinError,
    input::Input,
    tracks::{PlayMode, TrackHandle},
};
use tracing::{debug, info, warn};

use crate::{
    common::{errors::TransportError, types::VoiceTarget},
    player::{ControllerHandle, Ticket},
    voice::VoiceTransport,
};

/// [`VoiceTransport`] backed by a songbird call.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    target: VoiceTarget,
    controller: ControllerHandle<Input>,
    track: Option<TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(
        manager: Arc<Songbird>,
        target: VoiceTarget,
        controller: ControllerHandle<Input>,
    ) -> Self {
        Self {
            manager,
            target,
            controller,
            track: None,
        }
    }

    fn guild(&self) -> serenity::all::GuildId {
        self.target.guild_id.into()
    }

    fn channel(&self) -> serenity::all::ChannelId {
        self.target.channel_id.into()
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    type Input = Input;

    async fn join(&mut self, ticket: Ticket) -> Result<(), TransportError> {
        let mut live = None;
        if let Some(call) = self.manager.get(self.guild()) {
            let current = call.lock().await.current_channel();
            if current == Some(self.channel().into()) {
                debug!("Reusing voice connection to {}", self.target);
                live = Some(call);
            }
        }

        let call = match live {
            Some(call) => call,
            None => {
                let call = self.manager.join(self.guild(), self.channel()).await?;
                info!("Joined voice channel {}", self.target);
                call
            }
        };

        // One watcher per call, tagged with the session that owns it.
        let mut call = call.lock().await;
        call.remove_all_global_events();
        call.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectNotifier {
                ticket,
                controller: self.controller.clone(),
            },
        );
        Ok(())
    }

    async fn play(&mut self, input: Input, ticket: Ticket) -> Result<(), TransportError> {
        let call = self
            .manager
            .get(self.guild())
            .ok_or(TransportError::NotConnected)?;

        let handle = {
            let mut call = call.lock().await;
            // A call dropped from the channel stays in the manager.
            if call.current_channel().is_none() {
                return Err(TransportError::NotConnected);
            }
            call.play_only_input(input)
        };

        handle.add_event(
            Event::Track(TrackEvent::End),
            TrackNotifier {
                ticket,
                controller: self.controller.clone(),
            },
        )?;
        handle.add_event(
            Event::Track(TrackEvent::Error),
            TrackNotifier {
                ticket,
                controller: self.controller.clone(),
            },
        )?;

        info!("Playing stream {} in {}", ticket, self.target);
        self.track = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(track) = self.track.take() {
            if let Err(e) = track.stop() {
                debug!("Track already gone on stop: {}", e);
            }
        }
    }

    async fn leave(&mut self) -> Result<(), TransportError> {
        match self.manager.remove(self.guild()).await {
            Ok(()) => {
                info!("Left voice channel {}", self.target);
                Ok(())
            }
            Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reports the end or failure of one stream to the controller.
struct TrackNotifier {
    ticket: Ticket,
    controller: ControllerHandle<Input>,
}

#[async_trait]
impl VoiceEventHandler for TrackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };

        let failure = tracks.iter().find_map(|(state, _)| match &state.playing {
            PlayMode::Errored(e) => Some(format!("{e:?}")),
            _ => None,
        });

        match failure {
            Some(reason) => {
                warn!("Stream {} errored: {}", self.ticket, reason);
                self.controller.track_failed(self.ticket, reason);
            }
            None => {
                debug!("Stream {} ended", self.ticket);
                self.controller.track_ended(self.ticket);
            }
        }
        None
    }
}

/// Reports a dropped voice connection to the controller.
struct DisconnectNotifier {
    ticket: Ticket,
    controller: ControllerHandle<Input>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "Voice connection dropped ({}): {:?}",
                self.ticket, data.reason
            );
            self.controller.connection_lost(self.ticket);
        }
        None
    }
}
