use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the audio bytes are obtained.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Plain HTTP GET of an audio stream (Icecast, MP3 file, ...).
    Http,
    /// Page URL resolved to a media URL by yt-dlp.
    Extracted,
    /// ffmpeg reads the source and emits raw PCM.
    Transcoded,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Extracted => "extracted",
            Self::Transcoded => "transcoded",
        }
    }
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "stream" => Ok(Self::Http),
            "extracted" | "youtube" | "ytdl" => Ok(Self::Extracted),
            "transcoded" | "ffmpeg" => Ok(Self::Transcoded),
            other => Err(format!(
                "unknown source mode `{other}` (expected http, extracted or transcoded)"
            )),
        }
    }
}

/// `[source]` table as written in `config.toml`.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SourceSection {
    pub url: Option<String>,
    pub extracted_url: Option<String>,
    pub mode: Option<SourceMode>,
    pub ffmpeg_path: Option<String>,
}

/// Static description of where the audio comes from. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub url: String,
    pub mode: SourceMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub descriptor: SourceDescriptor,
    pub ffmpeg_path: String,
}

pub(crate) fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}
