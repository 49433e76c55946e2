/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Discord guild snowflake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct GuildId(pub u64);

impl From<u64> for GuildId {
    fn from(u: u64) -> Self {
        Self(u)
    }
}

impl From<GuildId> for serenity::all::GuildId {
    fn from(id: GuildId) -> Self {
        serenity::all::GuildId::new(id.0)
    }
}

impl std::fmt::Display for GuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discord channel snowflake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl From<u64> for ChannelId {
    fn from(u: u64) -> Self {
        Self(u)
    }
}

impl From<ChannelId> for serenity::all::ChannelId {
    fn from(id: ChannelId) -> Self {
        serenity::all::ChannelId::new(id.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The one voice channel this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceTarget {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

impl std::fmt::Display for VoiceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.guild_id, self.channel_id)
    }
}

/// Container formats the decoder can be hinted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    Aac,
    Opus,
    Webm,
    Mp4,
    Mp3,
    Ogg,
    Flac,
    Wav,
    Unknown,
}

impl AudioFormat {
    pub fn as_ext(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Opus => "opus",
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Unknown => "",
        }
    }

    pub fn from_ext(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "aac" => Self::Aac,
            "opus" => Self::Opus,
            "webm" => Self::Webm,
            "mp4" | "m4a" => Self::Mp4,
            "mp3" => Self::Mp3,
            "ogg" | "oga" => Self::Ogg,
            "flac" => Self::Flac,
            "wav" => Self::Wav,
            _ => Self::Unknown,
        }
    }

    /// Maps a `Content-Type` header value, ignoring parameters.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => Self::Mp3,
            "audio/aac" | "audio/aacp" => Self::Aac,
            "audio/ogg" | "application/ogg" => Self::Ogg,
            "audio/opus" => Self::Opus,
            "audio/webm" | "video/webm" => Self::Webm,
            "audio/mp4" | "video/mp4" => Self::Mp4,
            "audio/flac" | "audio/x-flac" => Self::Flac,
            "audio/wav" | "audio/x-wav" | "audio/wave" => Self::Wav,
            _ => Self::Unknown,
        }
    }

    /// Guesses the format from the URL path extension.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let last = path.rsplit('/').next().unwrap_or(path);
        match last.rsplit_once('.') {
            Some((_, ext)) => Self::from_ext(ext),
            None => Self::Unknown,
        }
    }
}
