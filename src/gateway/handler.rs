use async_trait::async_trait;
use serenity::{
    all::{Guild, Ready, VoiceState},
    client::{Context, EventHandler},
};
use tracing::{debug, info};

use crate::{
    common::types::VoiceTarget,
    gateway::presence::{self, PresenceReading},
    player::ControllerHandle,
};

/// Forwards membership changes of the target channel to the controller.
pub struct GatewayHandler<I> {
    target: VoiceTarget,
    controller: ControllerHandle<I>,
}

impl<I> GatewayHandler<I> {
    pub fn new(target: VoiceTarget, controller: ControllerHandle<I>) -> Self {
        Self { target, controller }
    }

    fn is_target_guild(&self, guild_id: Option<serenity::all::GuildId>) -> bool {
        guild_id.is_some_and(|id| id.get() == self.target.guild_id.0)
    }

    fn reconcile(&self, ctx: &Context) {
        let reading = presence::observe(&ctx.cache, self.target);
        if let PresenceReading::Humans(n) = reading {
            debug!("{} human(s) in {}", n, self.target);
        }
        self.controller.presence(reading);
    }
}

#[async_trait]
impl<I: Send + 'static> EventHandler for GatewayHandler<I> {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Logged in as {}", ready.user.name);
    }

    /// Catches users already sitting in the channel at startup.
    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        if self.is_target_guild(Some(guild.id)) {
            info!("Target guild {} available", guild.name);
            self.reconcile(&ctx);
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        if self.is_target_guild(new.guild_id) {
            self.reconcile(&ctx);
        }
    }
}
