pub mod extracted;
pub mod http;
pub mod transcode;

use async_trait::async_trait;
use songbird::input::Input;
use tracing::debug;

use crate::{
    common::{errors::SourceError, http::HttpClient},
    configs::{SourceConfig, SourceDescriptor, SourceMode},
};

pub use http::HttpStream;

/// Produces a fresh playable stream on every call.
///
/// Every call must open a new stream; a stream that ended is never reused.
#[async_trait]
pub trait StreamSupplier: Send + Sync + 'static {
    /// What the player consumes.
    type Output: Send + 'static;

    async fn supply(&self) -> Result<Self::Output, SourceError>;
}

/// Supplier for the configured source, dispatching on its mode.
pub struct SourceSupplier {
    descriptor: SourceDescriptor,
    ffmpeg_path: String,
    client: reqwest::Client,
}

impl SourceSupplier {
    pub fn new(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            descriptor: config.descriptor.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            client: HttpClient::new()?,
        })
    }
}

#[async_trait]
impl StreamSupplier for SourceSupplier {
    type Output = Input;

    async fn supply(&self) -> Result<Input, SourceError> {
        let url = &self.descriptor.url;
        debug!("Supplying {} stream for {}", self.descriptor.mode.as_str(), url);

        match self.descriptor.mode {
            SourceMode::Http => HttpStream::open(&self.client, url)
                .await
                .map(HttpStream::into_input),
            SourceMode::Extracted => extracted::resolve(self.client.clone(), url).await,
            SourceMode::Transcoded => transcode::spawn(&self.ffmpeg_path, url),
        }
    }
}
