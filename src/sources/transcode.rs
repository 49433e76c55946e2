use std::{
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom},
    process::{Command, Stdio},
};

use byteorder::{ByteOrder, LittleEndian};
use songbird::input::{AudioStream, ChildContainer, Input, LiveInput, RawAdapter};
use symphonia::core::io::MediaSource;
use tracing::{info, warn};

use crate::common::errors::SourceError;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;

/// Arguments for decoding `source` to interleaved 48 kHz stereo s16le on stdout.
pub fn ffmpeg_args(source: &str) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

    if source.starts_with("http://") || source.starts_with("https://") {
        args.extend(
            [
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
            ]
            .map(String::from),
        );
    }

    args.extend(["-i".to_string(), source.to_string()]);
    args.extend(
        [
            "-vn",
            "-f",
            "s16le",
            "-ar",
            "48000",
            "-ac",
            "2",
            "pipe:1",
        ]
        .map(String::from),
    );
    args
}

/// Starts the transcoder. Spawn failures are reported here; anything ffmpeg
/// hits later ends or breaks the output pipe and reaches the player instead.
pub fn spawn(program: &str, source: &str) -> Result<Input, SourceError> {
    let mut child = Command::new(program)
        .args(ffmpeg_args(source))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SourceError::Spawn {
            program: program.to_string(),
            source: e,
        })?;

    if child.stdout.is_none() {
        let _ = child.kill();
        let _ = child.wait();
        return Err(SourceError::NoOutput);
    }

    if let Some(stderr) = child.stderr.take() {
        let pid = child.id();
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                if !line.trim().is_empty() {
                    warn!("ffmpeg[{}]: {}", pid, line);
                }
            }
        });
    }

    info!("Spawned {} (pid {}) for {}", program, child.id(), source);

    let pcm = S16ToF32::new(ChildContainer::from(child));
    let adapter = RawAdapter::new(pcm, SAMPLE_RATE, CHANNELS);

    Ok(Input::Live(
        LiveInput::Raw(AudioStream {
            input: Box::new(adapter) as Box<dyn MediaSource>,
            hint: None,
        }),
        None,
    ))
}

/// Widens little-endian s16 PCM to little-endian f32 PCM.
///
/// A sample split across two reads of the inner source is held back until
/// its second byte arrives. A trailing half sample at end of stream is dropped.
pub struct S16ToF32<R> {
    inner: R,
    carry: Option<u8>,
    scratch: Vec<u8>,
    pending: Vec<u8>,
    pos: usize,
}

impl<R: Read> S16ToF32<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            carry: None,
            scratch: Vec::new(),
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// Returns false at end of stream.
    fn refill(&mut self, want: usize) -> io::Result<bool> {
        self.scratch.resize(want.max(2), 0);

        let mut start = 0;
        if let Some(byte) = self.carry.take() {
            self.scratch[0] = byte;
            start = 1;
        }

        let n = self.inner.read(&mut self.scratch[start..])?;
        if n == 0 {
            return Ok(false);
        }

        let total = start + n;
        let whole = total & !1;
        if whole != total {
            self.carry = Some(self.scratch[total - 1]);
        }

        self.pending.clear();
        self.pos = 0;
        for pair in self.scratch[..whole].chunks_exact(2) {
            let sample = LittleEndian::read_i16(pair) as f32 / 32768.0;
            let mut out = [0u8; 4];
            LittleEndian::write_f32(&mut out, sample);
            self.pending.extend_from_slice(&out);
        }
        Ok(true)
    }
}

impl<R: Read> Read for S16ToF32<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.pending.len() {
            if !self.refill(out.len() / 2)? {
                return Ok(0);
            }
        }

        let n = out.len().min(self.pending.len() - self.pos);
        out[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl<R> Seek for S16ToF32<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transcoded streams cannot seek",
        ))
    }
}

impl<R: Read + Send + Sync> MediaSource for S16ToF32<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out its data a few bytes at a time.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn samples(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(LittleEndian::read_f32)
            .collect()
    }

    fn drain<R: Read>(mut reader: R, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn pcm(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn converts_full_scale_values() {
        let input = pcm(&[0, i16::MIN, 16384, -16384]);
        let out = drain(S16ToF32::new(io::Cursor::new(input)), 64);
        assert_eq!(samples(&out), vec![0.0, -1.0, 0.5, -0.5]);
    }

    #[test]
    fn odd_read_boundaries_keep_samples_aligned() {
        let values: Vec<i16> = (0..64).map(|i| (i * 311 - 9000) as i16).collect();
        let expected: Vec<f32> = values.iter().map(|v| *v as f32 / 32768.0).collect();

        for step in [1, 3, 5, 7] {
            let source = Trickle {
                data: pcm(&values),
                pos: 0,
                step,
            };
            let out = drain(S16ToF32::new(source), 7);
            assert_eq!(samples(&out), expected, "step {step}");
        }
    }

    #[test]
    fn trailing_half_sample_is_dropped() {
        let mut input = pcm(&[1000]);
        input.push(0x7f);
        let out = drain(S16ToF32::new(io::Cursor::new(input)), 16);
        assert_eq!(samples(&out), vec![1000.0 / 32768.0]);
    }

    #[test]
    fn network_sources_get_reconnect_flags() {
        let args = ffmpeg_args("https://radio.example/live.aac");
        assert!(args.iter().any(|a| a == "-reconnect_streamed"));
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "https://radio.example/live.aac");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));

        let local = ffmpeg_args("/srv/music/loop.flac");
        assert!(!local.iter().any(|a| a == "-reconnect"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = spawn("/nonexistent/ffmpeg-airwave", "https://radio.example/a.mp3")
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Spawn { .. }));
    }
}
