use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value {value:?} for `{key}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Failure to obtain a playable stream. Recovered by retrying.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("stream fetch failed with status {status}: {url}")]
    Status { status: u16, url: String },

    #[error("stream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decoder process exposed no stdout")]
    NoOutput,
}

/// Voice connection or player failure. Recovered by retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to join voice channel: {0}")]
    Join(#[from] songbird::error::JoinError),

    #[error("no active voice call")]
    NotConnected,

    #[error("track control failed: {0}")]
    Control(#[from] songbird::error::ControlError),
}

/// The target channel could not be looked up. Treated as empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceUnavailable {
    #[error("guild {0} is not cached yet")]
    GuildNotCached(u64),

    #[error("channel {channel} not found in guild {guild}")]
    ChannelNotFound { guild: u64, channel: u64 },
}
