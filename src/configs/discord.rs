use serde::{Deserialize, Serialize};

use crate::common::types::{ChannelId, GuildId, VoiceTarget};

/// `[discord]` table as written in `config.toml`.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct DiscordSection {
    pub token: Option<String>,
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
}

#[derive(Clone, PartialEq)]
pub struct DiscordConfig {
    pub token: String,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

impl DiscordConfig {
    pub fn target(&self) -> VoiceTarget {
        VoiceTarget {
            guild_id: self.guild_id,
            channel_id: self.channel_id,
        }
    }
}

// The token never goes to the logs.
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .finish()
    }
}
