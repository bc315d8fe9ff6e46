//! Camera facade: device lifecycle, one-shot captures and surveillance.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::CameraError;
use crate::frame::FrameId;
use crate::media::{Photo, VideoFile};
use crate::record::{Recorder, SessionTag, VideoBackend, CODEC_CANDIDATES};
use crate::source::{FrameSource, SourceStats};
use crate::surveillance::{SurveillanceOptions, SurveillanceOrchestrator};

/// Longest wait for a single new frame while recording on demand.
const FRAME_WAIT: Duration = Duration::from_millis(500);

pub struct Camera {
    source: Arc<FrameSource>,
    recorder: Arc<Recorder>,
    surveillance: Mutex<Option<Arc<AtomicBool>>>,
}

impl Camera {
    /// Open `device` and pick the default encoder for it.
    ///
    /// Fails with [`CameraError::Connection`] when the device does not deliver
    /// a frame and with [`CameraError::CodecNotAvailable`] when no codec opens.
    pub fn open(device: &str) -> Result<Self> {
        let source = FrameSource::open(device)?;
        let backend = default_backend(device)?;
        Self::with_parts(source, backend)
    }

    pub fn with_parts(source: FrameSource, backend: Arc<dyn VideoBackend>) -> Result<Self> {
        let recorder = Recorder::new(backend, source.frame_size())?;
        Ok(Self {
            source: Arc::new(source),
            recorder: Arc::new(recorder),
            surveillance: Mutex::new(None),
        })
    }

    pub fn start(&self) -> Result<()> {
        self.source.start()
    }

    /// Stop capturing. Any running surveillance ends with the source.
    pub fn stop(&self) -> Result<()> {
        if let Some(flag) = self.current_surveillance() {
            flag.store(false, Ordering::SeqCst);
        }
        self.source.stop()
    }

    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    /// The latest frame as a JPEG.
    pub fn get_photo(&self, timestamp: bool) -> Result<Photo> {
        let (_, frame) = self.source.read(timestamp);
        Photo::from_frame(&frame)
    }

    /// Record at least `seconds` of distinct frames into a new video file.
    ///
    /// Blocks for the duration of the recording.
    pub fn get_video(&self, timestamp: bool, seconds: f64) -> Result<VideoFile> {
        if !self.source.is_running() {
            bail!("camera is not started");
        }
        if seconds.is_nan() || seconds <= 0.0 {
            bail!("video duration must be positive, got {}", seconds);
        }
        let mut session = self
            .recorder
            .session(SessionTag::OnDemand, self.source.fps(), seconds)?;

        let mut last_id: FrameId = 0;
        while !session.is_complete() {
            let Some((frame_id, frame)) = self.source.read_newer(last_id, timestamp, FRAME_WAIT)
            else {
                if !self.source.is_running() {
                    bail!("camera stopped while recording");
                }
                continue;
            };
            last_id = frame_id;
            session.push(frame_id, &frame)?;
        }
        session.finish()
    }

    /// Begin watching for motion.
    ///
    /// Returns `None` and leaves the running stream untouched when surveillance
    /// is already active or the camera is not started.
    pub fn surveillance_start(&self, options: SurveillanceOptions) -> Option<SurveillanceOrchestrator> {
        if !self.source.is_running() {
            log::warn!("surveillance not started: camera is not running");
            return None;
        }
        let mut current = match self.surveillance.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            log::warn!("surveillance already active, ignoring start");
            return None;
        }
        let active = Arc::new(AtomicBool::new(true));
        *current = Some(Arc::clone(&active));
        Some(SurveillanceOrchestrator::new(
            Arc::clone(&self.source),
            Arc::clone(&self.recorder),
            active,
            options,
        ))
    }

    /// Ask the running stream to end after its current frame.
    ///
    /// Returns `false` when nothing was running.
    pub fn surveillance_stop(&self) -> bool {
        match self.current_surveillance() {
            Some(flag) if flag.swap(false, Ordering::SeqCst) => {
                log::info!("surveillance stop requested");
                true
            }
            _ => {
                log::warn!("surveillance not active, ignoring stop");
                false
            }
        }
    }

    pub fn is_surveillance_active(&self) -> bool {
        self.current_surveillance()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn fps(&self) -> f64 {
        self.source.fps()
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.source.frame_size()
    }

    pub fn stats(&self) -> SourceStats {
        self.source.stats()
    }

    pub fn is_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    fn current_surveillance(&self) -> Option<Arc<AtomicBool>> {
        match self.surveillance.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// FFmpeg, for any device.
#[cfg(feature = "encode-ffmpeg")]
fn default_backend(_device: &str) -> Result<Arc<dyn VideoBackend>> {
    match crate::record::FfmpegBackend::new() {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(err) => {
            log::error!("ffmpeg unavailable: {:#}", err);
            Err(codec_unavailable())
        }
    }
}

/// Without FFmpeg only synthetic devices get a backend (raw frames).
#[cfg(not(feature = "encode-ffmpeg"))]
fn default_backend(device: &str) -> Result<Arc<dyn VideoBackend>> {
    if device.trim().starts_with("stub://") {
        return Ok(Arc::new(crate::record::StubVideoBackend::new()));
    }
    log::warn!("no video encoder compiled in; build with the encode-ffmpeg feature");
    Err(codec_unavailable())
}

fn codec_unavailable() -> anyhow::Error {
    let tried = CODEC_CANDIDATES
        .iter()
        .map(|codec| codec.fourcc())
        .collect::<Vec<_>>()
        .join(", ");
    CameraError::CodecNotAvailable { tried }.into()
}
