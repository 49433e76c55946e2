use songbird::input::{Compose, Input, LiveInput, YoutubeDl};
use tracing::info;

use crate::common::errors::SourceError;

/// Resolves a page URL through yt-dlp and opens the media it points at.
///
/// Resolution happens here rather than inside the voice driver so that an
/// extraction failure is reported to the caller.
pub async fn resolve(client: reqwest::Client, url: &str) -> Result<Input, SourceError> {
    let mut ytdl = YoutubeDl::new(client, url.to_string());

    let stream = ytdl
        .create_async()
        .await
        .map_err(|e| SourceError::Extraction(e.to_string()))?;

    info!("Resolved {} via yt-dlp", url);

    Ok(Input::Live(LiveInput::Raw(stream), Some(Box::new(ytdl))))
}
