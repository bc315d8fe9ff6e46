//! Raw-frame video backend.
//!
//! Writes a small header followed by uncompressed RGB frames. Used for
//! `stub://` devices and in tests, where no system encoder is available.

use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{Codec, VideoBackend, VideoWriter, CODEC_CANDIDATES};
use crate::frame::Frame;

const MAGIC: &[u8; 8] = b"RAWVID01";
const HEADER_LEN: usize = 8 + 4 + 4 + 4 + 8;

#[derive(Clone)]
pub struct StubVideoBackend {
    supported: Vec<Codec>,
    attempts: Arc<Mutex<Vec<Codec>>>,
}

impl Default for StubVideoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubVideoBackend {
    /// Accepts every codec.
    pub fn new() -> Self {
        Self::supporting(&CODEC_CANDIDATES)
    }

    /// Accepts only `codecs`; opening any other codec fails.
    pub fn supporting(codecs: &[Codec]) -> Self {
        Self {
            supported: codecs.to_vec(),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every codec `open` was called with, in order.
    pub fn attempts(&self) -> Vec<Codec> {
        match self.attempts.lock() {
            Ok(attempts) => attempts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Count the frames stored in a file written by this backend.
    pub fn frame_count(path: &Path) -> Result<usize> {
        let mut file =
            File::open(path).with_context(|| format!("open stub video {}", path.display()))?;
        let mut header = [0u8; HEADER_LEN];
        file.read_exact(&mut header)
            .context("stub video header truncated")?;
        if &header[..8] != MAGIC {
            bail!("{} is not a stub video", path.display());
        }
        let width = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as usize;
        let height = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
        let frame_len = width * height * 3;
        if frame_len == 0 {
            bail!("stub video has empty frame size");
        }
        let payload = file.metadata()?.len() as usize - HEADER_LEN;
        if payload % frame_len != 0 {
            bail!("stub video payload is not a whole number of frames");
        }
        Ok(payload / frame_len)
    }
}

impl VideoBackend for StubVideoBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open(
        &self,
        path: &Path,
        codec: Codec,
        fps: f64,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn VideoWriter>> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(codec);
        }
        if !self.supported.contains(&codec) {
            return Err(anyhow!("codec {} not supported by stub backend", codec));
        }
        let (width, height) = frame_size;
        if width == 0 || height == 0 {
            bail!("invalid frame size {}x{}", width, height);
        }

        let file =
            File::create(path).with_context(|| format!("create stub video {}", path.display()))?;
        let mut out = BufWriter::new(file);
        out.write_all(MAGIC)?;
        out.write_all(codec.fourcc().as_bytes())?;
        out.write_all(&width.to_le_bytes())?;
        out.write_all(&height.to_le_bytes())?;
        out.write_all(&fps.to_le_bytes())?;
        Ok(Box::new(StubVideoWriter {
            out,
            width,
            height,
        }))
    }
}

struct StubVideoWriter {
    out: BufWriter<File>,
    width: u32,
    height: u32,
}

impl VideoWriter for StubVideoWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if frame.size() != (self.width, self.height) {
            bail!(
                "frame size {}x{} does not match video {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            );
        }
        self.out.write_all(frame.image().as_raw())?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_counted_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.mp4");
        let backend = StubVideoBackend::new();
        let mut writer = backend.open(&path, Codec::Avc1, 15.0, (4, 3))?;
        for _ in 0..5 {
            writer.write(&Frame::filled(4, 3, [9, 9, 9]))?;
        }
        writer.finish()?;
        assert_eq!(StubVideoBackend::frame_count(&path)?, 5);
        Ok(())
    }

    #[test]
    fn mismatched_frames_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = StubVideoBackend::new();
        let mut writer = backend.open(&dir.path().join("a.mp4"), Codec::Mp4v, 10.0, (4, 3))?;
        assert!(writer.write(&Frame::filled(3, 4, [0, 0, 0])).is_err());
        Ok(())
    }

    #[test]
    fn unsupported_codec_fails_to_open() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = StubVideoBackend::supporting(&[Codec::Mp4v]);
        assert!(backend
            .open(&dir.path().join("a.mp4"), Codec::Avc1, 10.0, (2, 2))
            .is_err());
        assert!(!dir.path().join("a.mp4").exists());
        Ok(())
    }
}
