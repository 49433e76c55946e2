use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE};
use songbird::input::{AudioStream, Input, LiveInput};
use symphonia::core::{io::MediaSource, probe::Hint};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::common::{errors::SourceError, types::AudioFormat};

/// Chunks buffered between the network task and the decoder.
const CHUNK_QUEUE_DEPTH: usize = 32;

/// A live HTTP body exposed as a blocking, forward-only reader.
///
/// A tokio task pulls chunks off the response and hands them over a bounded
/// channel, so at most `CHUNK_QUEUE_DEPTH` chunks are ever held in memory.
pub struct HttpStream {
    rx: flume::Receiver<io::Result<Bytes>>,
    buf: Bytes,
    len: Option<u64>,
    content_type: Option<String>,
    url: String,
    finished: bool,
    pump: JoinHandle<()>,
}

impl HttpStream {
    /// Issues the GET. Anything but a 2xx status is an error.
    pub async fn open(client: &reqwest::Client, url: &str) -> Result<Self, SourceError> {
        let response = client
            .get(url)
            .header(ACCEPT, "*/*")
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let len = response.content_length();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        info!(
            "Opened HTTP stream: {} (type={:?}, len={:?})",
            url, content_type, len
        );

        let (tx, rx) = flume::bounded(CHUNK_QUEUE_DEPTH);
        let pump_url = url.to_string();
        let pump = tokio::spawn(async move {
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(io::Error::other);
                let failed = chunk.is_err();
                if tx.send_async(chunk).await.is_err() {
                    debug!("Reader for {} dropped, stopping pump", pump_url);
                    return;
                }
                if failed {
                    return;
                }
            }
            debug!("HTTP body ended: {}", pump_url);
        });

        Ok(Self {
            rx,
            buf: Bytes::new(),
            len,
            content_type,
            url: url.to_string(),
            finished: false,
            pump,
        })
    }

    /// Container guessed from the `Content-Type`, falling back to the URL path.
    pub fn format(&self) -> AudioFormat {
        match self.content_type.as_deref().map(AudioFormat::from_mime) {
            Some(AudioFormat::Unknown) | None => AudioFormat::from_url(&self.url),
            Some(known) => known,
        }
    }

    pub fn hint(&self) -> Hint {
        let mut hint = Hint::new();
        if let Some(mime) = &self.content_type {
            hint.mime_type(mime);
        }

        let format = self.format();
        if format != AudioFormat::Unknown {
            hint.with_extension(format.as_ext());
        }
        hint
    }

    pub fn into_input(self) -> Input {
        let hint = self.hint();
        Input::Live(
            LiveInput::Raw(AudioStream {
                input: Box::new(self) as Box<dyn MediaSource>,
                hint: Some(hint),
            }),
            None,
        )
    }
}

impl Drop for HttpStream {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl Read for HttpStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.buf.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Ok(chunk)) => self.buf = chunk,
                Ok(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                Err(flume::RecvError::Disconnected) => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }

        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf = self.buf.slice(n..);
        Ok(n)
    }
}

impl Seek for HttpStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live HTTP streams cannot seek",
        ))
    }
}

impl MediaSource for HttpStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

#[cfg(test)]
impl HttpStream {
    /// Stream fed from a channel instead of the network.
    fn from_channel(
        rx: flume::Receiver<io::Result<Bytes>>,
        content_type: Option<&str>,
        url: &str,
    ) -> Self {
        Self {
            rx,
            buf: Bytes::new(),
            len: None,
            content_type: content_type.map(str::to_string),
            url: url.to_string(),
            finished: false,
            pump: tokio::spawn(async {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_across_chunk_boundaries() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Ok(Bytes::from_static(b"ID3"))).unwrap();
        tx.send(Ok(Bytes::from_static(b"\x04\x00frame"))).unwrap();
        drop(tx);

        let mut stream = HttpStream::from_channel(rx, Some("audio/mpeg"), "https://r.example/live");
        let mut all = Vec::new();
        let mut small = [0u8; 2];
        loop {
            let n = stream.read(&mut small).unwrap();
            if n == 0 {
                break;
            }
            all.extend_from_slice(&small[..n]);
        }
        assert_eq!(all, b"ID3\x04\x00frame");
        assert_eq!(stream.read(&mut small).unwrap(), 0);
    }

    #[tokio::test]
    async fn body_error_surfaces_once() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Ok(Bytes::from_static(b"ab"))).unwrap();
        tx.send(Err(io::Error::other("connection reset"))).unwrap();

        let mut stream = HttpStream::from_channel(rx, None, "https://r.example/a.ogg");
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert!(stream.read(&mut buf).is_err());
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[tokio::test]
    async fn cannot_seek() {
        let (_tx, rx) = flume::bounded(1);
        let mut stream = HttpStream::from_channel(rx, None, "https://r.example/a.mp3");
        assert!(stream.seek(SeekFrom::Start(0)).is_err());
        assert!(!stream.is_seekable());
    }

    fn format_of(content_type: Option<&str>, url: &str) -> AudioFormat {
        let (_tx, rx) = flume::bounded(1);
        HttpStream::from_channel(rx, content_type, url).format()
    }

    #[tokio::test]
    async fn format_prefers_content_type() {
        assert_eq!(
            format_of(Some("audio/ogg"), "https://r.example/a.mp3"),
            AudioFormat::Ogg
        );
        assert_eq!(
            format_of(Some("audio/aacp; charset=binary"), "https://r.example/live"),
            AudioFormat::Aac
        );
    }

    #[tokio::test]
    async fn format_falls_back_to_url_extension() {
        assert_eq!(
            format_of(Some("application/octet-stream"), "https://r.example/a.flac?x=1"),
            AudioFormat::Flac
        );
        assert_eq!(format_of(None, "https://r.example/a.mp3"), AudioFormat::Mp3);
        assert_eq!(
            format_of(None, "https://r.example/live"),
            AudioFormat::Unknown
        );
    }
}
