//! Motion-triggered recording.
//!
//! `SurveillanceOrchestrator` consumes the motion detector's events and runs a
//! two-state machine:
//!
//! - `Idle`: waits for a frame with motion. On detection it opens an
//!   `on_motion` recording session, writes the triggering frame and then
//!   emits [`SurveillanceEvent::Detected`].
//! - `Recording`: on every event, first emits a photo whenever the number of
//!   recorded frames is a multiple of the photo interval, then appends the
//!   frame while the session is short of its target. Once the target is
//!   reached the session is finalized, [`SurveillanceEvent::Video`] is emitted
//!   and the machine returns to `Idle`.
//!
//! Frame counts are derived from the fps measured when surveillance starts.
//! The stream is pull-based: each `next_event` call blocks until the next
//! event or until surveillance is stopped. A session still open at stop is
//! discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::detect::{MotionDetector, MotionEvent};
use crate::media::{Photo, VideoFile};
use crate::record::{Recorder, RecordingSession, SessionTag};
use crate::source::FrameSource;

/// One record of the surveillance stream.
#[derive(Debug)]
pub enum SurveillanceEvent {
    /// Motion started; a recording is now in progress.
    Detected,
    /// A still taken during the recording. `id` counts from 1 up to roughly `total`.
    Photo { photo: Photo, id: u32, total: u32 },
    /// The finished recording.
    Video(VideoFile),
}

/// Parameters of one surveillance run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurveillanceOptions {
    pub timestamp: bool,
    pub video_seconds: f64,
    pub picture_seconds: f64,
    pub draw_contours: bool,
}

impl Default for SurveillanceOptions {
    fn default() -> Self {
        Self {
            timestamp: true,
            video_seconds: 30.0,
            picture_seconds: 5.0,
            draw_contours: true,
        }
    }
}

enum State {
    Idle,
    Recording(RecordingSession),
}

pub struct SurveillanceOrchestrator {
    detector: MotionDetector,
    recorder: Arc<Recorder>,
    active: Arc<AtomicBool>,
    options: SurveillanceOptions,
    fps: f64,
    photo_interval: usize,
    photo_total: u32,
    state: State,
    pending: VecDeque<SurveillanceEvent>,
}

/// Recorded frames between two photos: `floor(fps * seconds)`, at least 1.
pub fn photo_interval(fps: f64, picture_seconds: f64) -> usize {
    let frames = (fps * picture_seconds).floor();
    if frames.is_finite() && frames >= 1.0 {
        frames as usize
    } else {
        1
    }
}

/// Photos announced per video: `floor(video_seconds / picture_seconds)`.
pub fn photo_total(video_seconds: f64, picture_seconds: f64) -> u32 {
    if picture_seconds <= 0.0 {
        return 0;
    }
    let total = (video_seconds / picture_seconds).floor();
    if total.is_finite() && total > 0.0 {
        total as u32
    } else {
        0
    }
}

impl SurveillanceOrchestrator {
    /// Set up a run over a started source. `active` must already be set; the
    /// run ends when it is cleared.
    pub fn new(
        source: Arc<FrameSource>,
        recorder: Arc<Recorder>,
        active: Arc<AtomicBool>,
        options: SurveillanceOptions,
    ) -> Self {
        let fps = source.fps();
        let photo_interval = photo_interval(fps, options.picture_seconds);
        let photo_total = photo_total(options.video_seconds, options.picture_seconds);
        log::info!(
            "surveillance started: {:.1} fps, {}s videos, photo every {} frames",
            fps,
            options.video_seconds,
            photo_interval
        );
        Self {
            detector: MotionDetector::new(
                source,
                Arc::clone(&active),
                options.timestamp,
                options.draw_contours,
            ),
            recorder,
            active,
            options,
            fps,
            photo_interval,
            photo_total,
            state: State::Idle,
            pending: VecDeque::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, State::Recording(_))
    }

    /// Block until the next event. `None` once surveillance is stopped.
    pub fn next_event(&mut self) -> Option<SurveillanceEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.detector.next_event() {
                Some(motion) => self.handle(motion),
                None => {
                    self.shutdown();
                    return None;
                }
            }
        }
    }

    fn handle(&mut self, motion: MotionEvent) {
        if matches!(self.state, State::Idle) && motion.detected {
            match self
                .recorder
                .session(SessionTag::OnMotion, self.fps, self.options.video_seconds)
            {
                Ok(mut session) => {
                    if let Err(err) = session.push(motion.frame_id, &motion.frame) {
                        log::error!("recording: {:#}", err);
                        return;
                    }
                    log::info!("motion detected at frame {}, recording", motion.frame_id);
                    self.pending.push_back(SurveillanceEvent::Detected);
                    self.state = State::Recording(session);
                }
                Err(err) => {
                    log::error!("cannot open motion recording: {:#}", err);
                    return;
                }
            }
        }

        let State::Recording(session) = &mut self.state else {
            return;
        };

        let recorded = session.recorded();
        if recorded % self.photo_interval == 0 {
            match Photo::from_frame(&motion.frame) {
                Ok(photo) => self.pending.push_back(SurveillanceEvent::Photo {
                    photo,
                    id: (recorded / self.photo_interval) as u32,
                    total: self.photo_total,
                }),
                Err(err) => log::warn!("surveillance photo dropped: {:#}", err),
            }
        }

        if recorded < session.target() {
            if let Err(err) = session.push(motion.frame_id, &motion.frame) {
                log::error!("recording: {:#}", err);
                self.state = State::Idle;
            }
            return;
        }

        let State::Recording(session) = std::mem::replace(&mut self.state, State::Idle) else {
            return;
        };
        match session.finish() {
            Ok(video) => {
                log::info!("motion recording complete ({} frames)", video.frame_count());
                self.pending.push_back(SurveillanceEvent::Video(video));
            }
            Err(err) => log::error!("motion recording lost: {:#}", err),
        }
    }

    fn shutdown(&mut self) {
        if let State::Recording(session) = std::mem::replace(&mut self.state, State::Idle) {
            log::warn!(
                "surveillance stopped during recording, discarding {}",
                session.path().display()
            );
            session.abandon();
        }
        self.pending.clear();
    }
}

impl Iterator for SurveillanceOrchestrator {
    type Item = SurveillanceEvent;

    fn next(&mut self) -> Option<SurveillanceEvent> {
        self.next_event()
    }
}

impl Drop for SurveillanceOrchestrator {
    fn drop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            log::info!("surveillance stream dropped, stopping");
        }
        self.shutdown();
    }
}
