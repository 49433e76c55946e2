use serenity::cache::Cache;

use crate::common::{
    errors::PresenceUnavailable,
    types::{ChannelId, VoiceTarget},
};

/// Result of counting the humans in the target channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceReading {
    Humans(usize),
    Unavailable(PresenceUnavailable),
}

impl PresenceReading {
    /// Unavailable counts as empty.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Humans(n) if *n > 0)
    }
}

/// One voice state as seen by the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub user_id: u64,
    pub channel_id: Option<u64>,
    pub is_bot: bool,
}

/// What the cache knows about the target guild.
#[derive(Debug, Clone, Default)]
pub struct GuildOccupancy {
    pub channel_exists: bool,
    pub occupants: Vec<Occupant>,
}

/// Humans in `channel`, never counting the user `me`.
pub fn count_humans<I>(occupants: I, channel: ChannelId, me: u64) -> usize
where
    I: IntoIterator<Item = Occupant>,
{
    occupants
        .into_iter()
        .filter(|o| o.channel_id == Some(channel.0) && !o.is_bot && o.user_id != me)
        .count()
}

/// Turns a cache snapshot of the target guild into a reading.
pub fn reading(target: VoiceTarget, me: u64, guild: Option<GuildOccupancy>) -> PresenceReading {
    let Some(guild) = guild else {
        return PresenceReading::Unavailable(PresenceUnavailable::GuildNotCached(
            target.guild_id.0,
        ));
    };

    if !guild.channel_exists {
        return PresenceReading::Unavailable(PresenceUnavailable::ChannelNotFound {
            guild: target.guild_id.0,
            channel: target.channel_id.0,
        });
    }

    PresenceReading::Humans(count_humans(guild.occupants, target.channel_id, me))
}

/// Reads the current membership of `target` from the gateway cache.
///
/// Members whose user record is not cached are counted as humans; the bot's
/// own voice state is always excluded.
pub fn observe(cache: &Cache, target: VoiceTarget) -> PresenceReading {
    let me = cache.current_user().id.get();

    let snapshot = cache
        .guild(serenity::all::GuildId::from(target.guild_id))
        .map(|guild| GuildOccupancy {
            channel_exists: guild
                .channels
                .contains_key(&serenity::all::ChannelId::from(target.channel_id)),
            occupants: guild
                .voice_states
                .values()
                .map(|state| Occupant {
                    user_id: state.user_id.get(),
                    channel_id: state.channel_id.map(|c| c.get()),
                    is_bot: state
                        .member
                        .as_ref()
                        .map(|m| m.user.bot)
                        .or_else(|| cache.user(state.user_id).map(|u| u.bot))
                        .unwrap_or(false),
                })
                .collect(),
        });

    reading(target, me, snapshot)
}
