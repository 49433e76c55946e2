use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{common::errors::ConfigError, configs::*};

/// Config file names looked up in the working directory, first match wins.
const CONFIG_PATHS: [&str; 2] = ["config.toml", "config.default.toml"];

/// Everything `config.toml` may contain. All fields are optional so the
/// environment can supply the rest.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub discord: DiscordSection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl FileConfig {
    pub fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Reads the first config file found. A missing file is not an error.
    pub fn read() -> Result<Self, ConfigError> {
        let Some(path) = CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) else {
            return Ok(Self::default());
        };

        crate::log_println!("Loading configuration from: {}", path);

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &contents)
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub discord: DiscordConfig,
    pub source: SourceConfig,
    pub playback: PlaybackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// File, then `.env`, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = FileConfig::read()?;
        // A missing .env is the normal case in containers.
        let _ = dotenvy::dotenv();
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = Lookup { env: &env };

        let token = lookup
            .string("BOT_TOKEN", file.discord.token)
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let guild_id = snowflake(
            "GUILD_ID",
            lookup
                .parsed::<u64>("GUILD_ID", file.discord.guild_id)?
                .ok_or(ConfigError::Missing("GUILD_ID"))?,
        )?;
        let channel_id = snowflake(
            "CHANNEL_ID",
            lookup
                .parsed::<u64>("CHANNEL_ID", file.discord.channel_id)?
                .ok_or(ConfigError::Missing("CHANNEL_ID"))?,
        )?;

        let music_url = lookup
            .string("MUSIC_URL", file.source.url)
            .ok_or(ConfigError::Missing("MUSIC_URL"))?;
        let extracted_url = lookup.string("YOUTUBE_URL", file.source.extracted_url);
        let mode = lookup
            .parsed::<SourceMode>("SOURCE_MODE", file.source.mode)?
            .unwrap_or(if extracted_url.is_some() {
                SourceMode::Extracted
            } else {
                SourceMode::Http
            });

        let url = match mode {
            SourceMode::Extracted => extracted_url.unwrap_or(music_url),
            _ => music_url,
        };

        if mode != SourceMode::Transcoded && !is_http_url(&url) {
            return Err(ConfigError::Invalid {
                key: "MUSIC_URL",
                value: url,
                reason: format!("{} sources need an http(s) URL", mode.as_str()),
            });
        }

        let ffmpeg_path = lookup
            .string("FFMPEG_PATH", file.source.ffmpeg_path)
            .unwrap_or_else(default_ffmpeg_path);

        let mut playback = file.playback;
        if let Some(ms) = lookup.parsed::<u64>("RETRY_DELAY_MS", None)? {
            playback.retry_delay_ms = ms;
        }

        let mut server = file.server;
        if let Some(port) = lookup.parsed::<u16>("PORT", None)? {
            server.port = port;
        }
        if let Some(host) = lookup.string("HOST", None) {
            server.host = host;
        }
        if let Some(enabled) = lookup.parsed::<bool>("LIVENESS_ENABLED", None)? {
            server.enabled = enabled;
        }

        let mut logging = file.logging;
        if let Some(level) = lookup.string("LOG_LEVEL", None) {
            logging.level = Some(level);
        }

        Ok(Self {
            discord: DiscordConfig {
                token,
                guild_id: guild_id.into(),
                channel_id: channel_id.into(),
            },
            source: SourceConfig {
                descriptor: SourceDescriptor { url, mode },
                ffmpeg_path,
            },
            playback,
            server,
            logging,
        })
    }
}

/// Discord ids are never zero.
fn snowflake(key: &'static str, id: u64) -> Result<u64, ConfigError> {
    if id == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: id.to_string(),
            reason: "Discord ids are non-zero".to_string(),
        });
    }
    Ok(id)
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

struct Lookup<'a, F> {
    env: &'a F,
}

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Environment value if set and non-blank, otherwise the file value.
    fn string(&self, key: &str, fallback: Option<String>) -> Option<String> {
        (self.env)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or(fallback.filter(|v| !v.trim().is_empty()))
    }

    fn parsed<T>(&self, key: &'static str, fallback: Option<T>) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(key, None) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: e.to_string(),
                }),
            None => Ok(fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("BOT_TOKEN", "token"),
        ("GUILD_ID", "111"),
        ("CHANNEL_ID", "222"),
        ("MUSIC_URL", "https://radio.example/stream.mp3"),
    ];

    #[test]
    fn resolves_from_environment_with_defaults() {
        let config = Config::resolve(FileConfig::default(), env(&REQUIRED)).unwrap();

        assert_eq!(config.discord.token, "token");
        assert_eq!(config.discord.guild_id.0, 111);
        assert_eq!(config.discord.channel_id.0, 222);
        assert_eq!(config.source.descriptor.mode, SourceMode::Http);
        assert_eq!(
            config.source.descriptor.url,
            "https://radio.example/stream.mp3"
        );
        assert_eq!(config.source.ffmpeg_path, "ffmpeg");
        assert_eq!(config.playback.retry_delay_ms, 5000);
        assert_eq!(config.server.port, 3000);
        assert!(config.server.enabled);
    }

    #[test]
    fn each_required_key_is_reported() {
        for (missing, _) in REQUIRED {
            let pairs: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != missing).collect();
            let err = Config::resolve(FileConfig::default(), env(&pairs)).unwrap_err();
            match err {
                ConfigError::Missing(key) => assert_eq!(key, missing),
                other => panic!("expected Missing({missing}), got {other:?}"),
            }
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("BOT_TOKEN", "   ");
        let err = Config::resolve(FileConfig::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn non_numeric_ids_are_invalid() {
        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("GUILD_ID", "my-guild");
        let err = Config::resolve(FileConfig::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "GUILD_ID", .. }));
    }

    #[test]
    fn zero_ids_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs[2] = ("CHANNEL_ID", "0");
        let err = Config::resolve(FileConfig::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CHANNEL_ID", .. }));
    }

    #[test]
    fn placeholder_ids_from_file_are_rejected() {
        let file = FileConfig::parse(
            "config.toml",
            r#"
            [discord]
            guild_id = 0
            channel_id = 0
            "#,
        )
        .unwrap();

        let err = Config::resolve(file, env(&REQUIRED[..1])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "GUILD_ID", .. }));
    }

    #[test]
    fn sample_config_does_not_resolve_on_its_own() {
        let file = FileConfig::parse(
            "config.example.toml",
            include_str!("../../config.example.toml"),
        )
        .unwrap();

        let err = Config::resolve(file, env(&[("BOT_TOKEN", "token")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GUILD_ID")));
    }

    #[test]
    fn music_url_is_required_in_extracted_mode() {
        let pairs = [
            ("BOT_TOKEN", "token"),
            ("GUILD_ID", "111"),
            ("CHANNEL_ID", "222"),
            ("YOUTUBE_URL", "https://www.youtube.com/watch?v=jfKfPfyJRdk"),
        ];
        let err = Config::resolve(FileConfig::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MUSIC_URL")));
    }

    #[test]
    fn youtube_url_selects_extracted_mode() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("YOUTUBE_URL", "https://www.youtube.com/watch?v=jfKfPfyJRdk"));
        let config = Config::resolve(FileConfig::default(), env(&pairs)).unwrap();

        assert_eq!(config.source.descriptor.mode, SourceMode::Extracted);
        assert_eq!(
            config.source.descriptor.url,
            "https://www.youtube.com/watch?v=jfKfPfyJRdk"
        );
    }

    #[test]
    fn transcoded_mode_accepts_local_paths() {
        let pairs = [
            ("BOT_TOKEN", "token"),
            ("GUILD_ID", "111"),
            ("CHANNEL_ID", "222"),
            ("MUSIC_URL", "/srv/music/loop.flac"),
            ("SOURCE_MODE", "ffmpeg"),
            ("FFMPEG_PATH", "/usr/local/bin/ffmpeg"),
        ];
        let config = Config::resolve(FileConfig::default(), env(&pairs)).unwrap();
        assert_eq!(config.source.descriptor.mode, SourceMode::Transcoded);
        assert_eq!(config.source.ffmpeg_path, "/usr/local/bin/ffmpeg");
    }

    #[test]
    fn http_mode_rejects_non_http_urls() {
        let mut pairs = REQUIRED.to_vec();
        pairs[3] = ("MUSIC_URL", "/srv/music/loop.flac");
        let err = Config::resolve(FileConfig::default(), env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MUSIC_URL", .. }));
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig::parse(
            "config.toml",
            r#"
            [discord]
            token = "file-token"
            guild_id = 1
            channel_id = 2

            [source]
            url = "https://file.example/a.ogg"

            [playback]
            retry_delay_ms = 2500

            [server]
            port = 8080

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = Config::resolve(file, env(&[("BOT_TOKEN", "env-token"), ("PORT", "9090")]))
            .unwrap();

        assert_eq!(config.discord.token, "env-token");
        assert_eq!(config.discord.guild_id.0, 1);
        assert_eq!(config.source.descriptor.url, "https://file.example/a.ogg");
        assert_eq!(config.playback.retry_delay_ms, 2500);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = FileConfig::parse("config.toml", "[discord\ntoken = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn debug_output_hides_token() {
        let config = Config::resolve(FileConfig::default(), env(&REQUIRED)).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("\"token\""));
        assert!(rendered.contains("<redacted>"));
    }
}
