//! Video recording.
//!
//! - `VideoBackend`: opens encoders (`VideoWriter`) for a codec and path.
//! - `probe_codec`: picks the first candidate codec the backend can open.
//! - `RecordingSession`: one encoder accumulating distinct frames up to a
//!   target count derived from the measured frame rate.
//!
//! Backends: FFmpeg (feature: encode-ffmpeg) for real MP4 files, and a stub
//! backend that writes raw frames for tests and `stub://` devices.

#[cfg(feature = "encode-ffmpeg")]
pub mod ffmpeg;
mod session;
pub mod stub;

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::error::CameraError;
use crate::frame::Frame;

#[cfg(feature = "encode-ffmpeg")]
pub use self::ffmpeg::FfmpegBackend;
pub use session::{frames_for, RecordingSession, SessionTag};
pub use stub::StubVideoBackend;

/// Name of the throwaway file written while probing codecs.
pub const PROBE_FILE: &str = "test_codec.mp4";

/// Video codecs, identified by their MP4 fourcc.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    /// H.264 / AVC.
    Avc1,
    /// MPEG-4 Part 2.
    Mp4v,
}

/// Probe order: the broadly compatible codec first, then the fallback.
pub const CODEC_CANDIDATES: [Codec; 2] = [Codec::Avc1, Codec::Mp4v];

impl Codec {
    pub fn fourcc(self) -> &'static str {
        match self {
            Codec::Avc1 => "avc1",
            Codec::Mp4v => "mp4v",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fourcc())
    }
}

/// Factory for encoders. Shared by every session of a camera.
pub trait VideoBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open an encoder writing `path`. An error means the codec cannot be used.
    fn open(
        &self,
        path: &Path,
        codec: Codec,
        fps: f64,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn VideoWriter>>;
}

/// One open encoder.
pub trait VideoWriter: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the container. The file is complete afterwards.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Select the codec for a camera's lifetime by opening a 2x2 writer with
/// each candidate in order.
///
/// Fails with [`CameraError::CodecNotAvailable`] when none opens.
pub fn probe_codec(backend: &dyn VideoBackend, dir: &Path) -> Result<Codec> {
    let path = dir.join(PROBE_FILE);
    for codec in CODEC_CANDIDATES {
        let opened = backend
            .open(&path, codec, 1.0, (2, 2))
            .and_then(|writer| writer.finish());
        // Probe output is never used.
        let _ = std::fs::remove_file(&path);
        match opened {
            Ok(()) => {
                log::info!("video codec {} selected ({} backend)", codec, backend.name());
                return Ok(codec);
            }
            Err(err) => {
                log::debug!("video codec {} unavailable: {:#}", codec, err);
            }
        }
    }

    let tried = CODEC_CANDIDATES
        .iter()
        .map(|codec| codec.fourcc())
        .collect::<Vec<_>>()
        .join(", ");
    Err(CameraError::CodecNotAvailable { tried }.into())
}

/// Everything a camera needs to open recording sessions: the backend, the
/// codec chosen once at construction, and the temporary directory that holds
/// probe and session files for the camera's lifetime.
pub struct Recorder {
    backend: Arc<dyn VideoBackend>,
    codec: Codec,
    frame_size: (u32, u32),
    dir: TempDir,
}

impl Recorder {
    /// Create the working directory and probe for a codec.
    pub fn new(backend: Arc<dyn VideoBackend>, frame_size: (u32, u32)) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("surveillance-")
            .tempdir()
            .context("create recording directory")?;
        let codec = probe_codec(backend.as_ref(), dir.path())?;
        Ok(Self {
            backend,
            codec,
            frame_size,
            dir,
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Open a session covering `seconds` of footage at the given measured rate.
    pub fn session(&self, tag: SessionTag, fps: f64, seconds: f64) -> Result<RecordingSession> {
        RecordingSession::open(
            self.backend.as_ref(),
            self.dir.path(),
            self.codec,
            tag,
            fps,
            self.frame_size,
            seconds,
        )
    }
}
