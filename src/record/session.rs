use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{Codec, VideoBackend, VideoWriter};
use crate::frame::{Frame, FrameId};
use crate::media::VideoFile;

/// What started a recording; part of the file name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionTag {
    OnDemand,
    OnMotion,
}

impl SessionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionTag::OnDemand => "on_demand",
            SessionTag::OnMotion => "on_motion",
        }
    }
}

/// Frames needed to cover `seconds` at `fps`, rounded up so the recording is
/// never shorter than requested. At least one frame.
pub fn frames_for(fps: f64, seconds: f64) -> usize {
    let frames = (fps * seconds).ceil();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}

/// One open video file collecting distinct frames.
pub struct RecordingSession {
    path: PathBuf,
    codec: Codec,
    fps: f64,
    writer: Option<Box<dyn VideoWriter>>,
    target: usize,
    recorded: HashSet<FrameId>,
}

impl RecordingSession {
    /// Open a new file in `dir` sized for `seconds` of footage at `fps`.
    pub fn open(
        backend: &dyn VideoBackend,
        dir: &Path,
        codec: Codec,
        tag: SessionTag,
        fps: f64,
        frame_size: (u32, u32),
        seconds: f64,
    ) -> Result<Self> {
        let path = unique_video_path(dir, tag);
        let writer = backend
            .open(&path, codec, fps, frame_size)
            .with_context(|| format!("open {} writer for {}", codec, path.display()))?;
        let target = frames_for(fps, seconds);
        log::debug!(
            "recording {} frames ({:.1} fps x {}s) to {}",
            target,
            fps,
            seconds,
            path.display()
        );
        Ok(Self {
            path,
            codec,
            fps,
            writer: Some(writer),
            target,
            recorded: HashSet::with_capacity(target),
        })
    }

    /// Encode `frame` unless a frame with this id was already recorded.
    /// Returns whether the frame was written.
    pub fn push(&mut self, frame_id: FrameId, frame: &Frame) -> Result<bool> {
        if self.recorded.contains(&frame_id) {
            return Ok(false);
        }
        let writer = self
            .writer
            .as_mut()
            .context("recording session already closed")?;
        writer.write(frame)?;
        self.recorded.insert(frame_id);
        Ok(true)
    }

    pub fn recorded(&self) -> usize {
        self.recorded.len()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn is_complete(&self) -> bool {
        self.recorded.len() >= self.target
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finalize the container and hand the file over.
    pub fn finish(mut self) -> Result<VideoFile> {
        let writer = self
            .writer
            .take()
            .context("recording session already closed")?;
        writer
            .finish()
            .with_context(|| format!("finalize {}", self.path.display()))?;
        log::debug!(
            "recording finished: {} frames in {}",
            self.recorded.len(),
            self.path.display()
        );
        Ok(VideoFile::new(
            self.path.clone(),
            self.codec,
            self.recorded.len(),
            self.fps,
        ))
    }

    /// Close the encoder and delete the partial file.
    pub fn abandon(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        if let Err(err) = writer.finish() {
            log::debug!("closing abandoned recording failed: {:#}", err);
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::debug!("removing {} failed: {}", self.path.display(), err);
        }
        log::warn!(
            "recording abandoned after {}/{} frames",
            self.recorded.len(),
            self.target
        );
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.discard();
    }
}

/// `YYYY-MM-DD_HH-MM-SS_<tag>.mp4`, with a counter appended when a file of
/// that name already exists.
fn unique_video_path(dir: &Path, tag: SessionTag) -> PathBuf {
    let stem = format!(
        "{}_{}",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"),
        tag.as_str()
    );
    let mut path = dir.join(format!("{}.mp4", stem));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}.mp4", stem, counter));
        counter += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StubVideoBackend;

    #[test]
    fn frame_target_rounds_up() {
        assert_eq!(frames_for(30.0, 1.0), 30);
        assert_eq!(frames_for(29.5, 1.0), 30);
        assert_eq!(frames_for(10.0, 0.25), 3);
        assert_eq!(frames_for(0.0, 5.0), 1);
        assert_eq!(frames_for(f64::NAN, 5.0), 1);
    }

    #[test]
    fn duplicates_are_not_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = StubVideoBackend::new();
        let mut session = RecordingSession::open(
            &backend,
            dir.path(),
            Codec::Avc1,
            SessionTag::OnDemand,
            4.0,
            (8, 6),
            1.0,
        )?;
        let frame = Frame::filled(8, 6, [1, 2, 3]);

        assert!(session.push(1, &frame)?);
        assert!(!session.push(1, &frame)?);
        assert!(session.push(2, &frame)?);
        assert_eq!(session.recorded(), 2);
        assert!(!session.is_complete());
        assert!(session.push(3, &frame)?);
        assert!(session.push(4, &frame)?);
        assert!(session.is_complete());

        let video = session.finish()?;
        assert_eq!(video.frame_count(), 4);
        assert_eq!(StubVideoBackend::frame_count(video.path())?, 4);
        let name = video
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        assert!(name.ends_with("_on_demand.mp4"), "{}", name);
        Ok(())
    }

    #[test]
    fn fractional_duration_fills_a_whole_extra_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = StubVideoBackend::new();
        let mut session = RecordingSession::open(
            &backend,
            dir.path(),
            Codec::Mp4v,
            SessionTag::OnDemand,
            7.0,
            (4, 4),
            0.5,
        )?;
        assert_eq!(session.target(), 4);

        let frame = Frame::filled(4, 4, [9, 9, 9]);
        let mut id = 0;
        while !session.is_complete() {
            id += 1;
            session.push(id, &frame)?;
        }
        let video = session.finish()?;
        assert_eq!(video.frame_count(), 4);
        assert_eq!(video.fps(), 7.0);
        assert!(video.frame_count() as f64 >= video.fps() * 0.5);
        assert_eq!(StubVideoBackend::frame_count(video.path())?, 4);
        Ok(())
    }

    #[test]
    fn same_second_sessions_get_distinct_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = StubVideoBackend::new();
        let open = || {
            RecordingSession::open(
                &backend,
                dir.path(),
                Codec::Mp4v,
                SessionTag::OnMotion,
                10.0,
                (4, 4),
                1.0,
            )
        };
        let a = open()?;
        let b = open()?;
        assert_ne!(a.path(), b.path());
        Ok(())
    }

    #[test]
    fn dropped_sessions_leave_no_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = StubVideoBackend::new();
        let mut session = RecordingSession::open(
            &backend,
            dir.path(),
            Codec::Avc1,
            SessionTag::OnMotion,
            10.0,
            (4, 4),
            1.0,
        )?;
        session.push(1, &Frame::filled(4, 4, [0, 0, 0]))?;
        let path = session.path().to_path_buf();
        assert!(path.exists());

        session.abandon();
        assert!(!path.exists());
        Ok(())
    }
}
