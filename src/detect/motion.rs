//! Frame-differencing motion detection.
//!
//! Each frame is reduced to a blurred grayscale plane and compared with the
//! previous one:
//!
//! 1. grayscale, Gaussian blur 21x21
//! 2. absolute difference with the previous blurred frame
//! 3. threshold at intensity 5
//! 4. morphological close with a 40x40 rectangle
//! 5. external contours; any contour of area >= 2000 px² means motion
//!
//! The first frame only establishes the baseline. A frame whose id equals the
//! last processed id is skipped.

use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::contours::find_external_contours;
use super::filters::{abs_diff, close, gaussian_blur, threshold};
use super::result::MotionEvent;
use crate::frame::{Frame, FrameId};
use crate::overlay::{self, GREEN};
use crate::source::FrameSource;

pub const BLUR_KERNEL: usize = 21;
pub const DIFF_THRESHOLD: u8 = 5;
pub const CLOSE_KERNEL: usize = 40;
pub const MIN_CONTOUR_AREA: f64 = 2000.0;

/// How long one wait for a fresh frame may block before the loop re-checks
/// its cancellation flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stateful comparison of consecutive frames. Pure: no threads, no I/O.
pub struct MotionAnalyzer {
    draw_contours: bool,
    previous: Option<GrayImage>,
    last_id: Option<FrameId>,
}

impl MotionAnalyzer {
    pub fn new(draw_contours: bool) -> Self {
        Self {
            draw_contours,
            previous: None,
            last_id: None,
        }
    }

    /// Feed one frame. Returns `None` for a repeated id and for the baseline frame.
    pub fn process(&mut self, frame_id: FrameId, mut frame: Frame) -> Option<MotionEvent> {
        if self.last_id == Some(frame_id) {
            return None;
        }
        self.last_id = Some(frame_id);

        let gray = gaussian_blur(&frame.to_gray(), BLUR_KERNEL);
        let Some(previous) = self.previous.replace(gray) else {
            return None;
        };
        let current = self.previous.as_ref()?;
        if previous.dimensions() != current.dimensions() {
            log::warn!("MotionAnalyzer: frame size changed, resetting baseline");
            return None;
        }

        let mask = close(
            &threshold(&abs_diff(&previous, current), DIFF_THRESHOLD),
            CLOSE_KERNEL,
        );
        let regions: Vec<_> = find_external_contours(&mask)
            .iter()
            .filter(|contour| contour.area() >= MIN_CONTOUR_AREA)
            .map(|contour| contour.bounding_rect())
            .collect();

        if self.draw_contours {
            for rect in &regions {
                overlay::draw_rect(&mut frame, *rect, GREEN);
            }
        }
        Some(MotionEvent {
            detected: !regions.is_empty(),
            frame_id,
            frame,
            regions,
        })
    }
}

/// Endless stream of motion events over a running frame source.
///
/// Runs until `active` is cleared; the flag is checked before every frame, so
/// stopping takes at most one frame period (bounded by the poll interval).
/// A stopped frame source also ends the stream and clears the flag.
pub struct MotionDetector {
    source: Arc<FrameSource>,
    active: Arc<AtomicBool>,
    analyzer: MotionAnalyzer,
    timestamp: bool,
    last_id: FrameId,
}

impl MotionDetector {
    pub fn new(
        source: Arc<FrameSource>,
        active: Arc<AtomicBool>,
        timestamp: bool,
        draw_contours: bool,
    ) -> Self {
        Self {
            source,
            active,
            analyzer: MotionAnalyzer::new(draw_contours),
            timestamp,
            last_id: 0,
        }
    }

    /// Block until the next distinct frame has been analyzed.
    ///
    /// Returns `None` once the active flag is cleared.
    pub fn next_event(&mut self) -> Option<MotionEvent> {
        while self.active.load(Ordering::SeqCst) {
            let Some((frame_id, frame)) =
                self.source
                    .read_newer(self.last_id, self.timestamp, POLL_INTERVAL)
            else {
                if !self.source.is_running() {
                    log::warn!("MotionDetector: frame source stopped, ending detection");
                    self.active.store(false, Ordering::SeqCst);
                    return None;
                }
                continue;
            };
            self.last_id = frame_id;
            if let Some(event) = self.analyzer.process(frame_id, frame) {
                return Some(event);
            }
        }
        None
    }
}

impl Iterator for MotionDetector {
    type Item = MotionEvent;

    fn next(&mut self) -> Option<MotionEvent> {
        self.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    use crate::ingest::ScriptedDevice;

    const W: u32 = 160;
    const H: u32 = 120;

    fn background() -> Frame {
        Frame::filled(W, H, [60, 60, 60])
    }

    fn with_block(x: u32, y: u32, size: u32) -> Frame {
        let mut frame = background();
        frame.fill_rect(x, y, size, size, [250, 250, 250]);
        frame
    }

    #[test]
    fn baseline_then_still_then_motion() {
        let mut analyzer = MotionAnalyzer::new(false);

        assert!(analyzer.process(0, background()).is_none());

        let still = analyzer.process(1, background()).expect("second frame is compared");
        assert!(!still.detected);
        assert_eq!(still.frame_id, 1);

        let moved = analyzer
            .process(2, with_block(50, 30, 50))
            .expect("third frame is compared");
        assert!(moved.detected);
        assert_eq!(moved.frame_id, 2);
        assert_eq!(moved.frame, with_block(50, 30, 50));
    }

    #[test]
    fn repeated_ids_are_skipped() {
        let mut analyzer = MotionAnalyzer::new(false);
        assert!(analyzer.process(4, background()).is_none());
        assert!(analyzer.process(4, with_block(10, 10, 50)).is_none());
        assert!(analyzer.process(5, background()).is_some());
    }

    #[test]
    fn small_changes_are_ignored() {
        let mut analyzer = MotionAnalyzer::new(true);
        analyzer.process(0, background());
        let event = analyzer.process(1, with_block(70, 50, 6)).expect("compared");
        assert!(!event.detected);
        assert!(event.regions.is_empty());
        assert_eq!(event.frame, with_block(70, 50, 6));
    }

    #[test]
    fn detected_regions_are_outlined_in_green() {
        let mut analyzer = MotionAnalyzer::new(true);
        analyzer.process(0, background());
        let event = analyzer.process(1, with_block(50, 30, 50)).expect("compared");
        assert!(event.detected);
        assert_eq!(event.regions.len(), 1);

        let rect = event.regions[0];
        assert!(rect.x <= 50 && rect.y <= 30);
        assert!(rect.x + rect.width >= 100 && rect.y + rect.height >= 80);
        assert_eq!(event.frame.image().get_pixel(rect.x, rect.y).0, GREEN);
    }

    #[test]
    fn two_moving_objects_both_count() {
        let mut analyzer = MotionAnalyzer::new(false);
        analyzer.process(0, background());
        let mut frame = with_block(5, 5, 45);
        frame.fill_rect(110, 70, 45, 45, [250, 250, 250]);
        let event = analyzer.process(1, frame).expect("compared");
        assert!(event.detected);
        assert_eq!(event.regions.len(), 2);
    }

    #[test]
    fn burst_scene_goes_still_then_moving_then_still() -> Result<()> {
        use crate::ingest::{CaptureDevice, SyntheticConfig, SyntheticDevice, SyntheticScene};

        let mut device = SyntheticDevice::open(SyntheticConfig {
            scene: SyntheticScene::Burst,
            fps: 1000,
            ..SyntheticConfig::default()
        })?;
        let mut analyzer = MotionAnalyzer::new(false);
        let mut detected = Vec::new();
        for id in 0..135 {
            let frame = device.read_frame()?;
            if let Some(event) = analyzer.process(id, frame) {
                detected.push((id, event.detected));
            }
        }

        assert_eq!(detected.len(), 134);
        let during = |range: std::ops::RangeInclusive<FrameId>| {
            detected
                .iter()
                .filter(move |(id, _)| range.contains(id))
                .map(|&(_, hit)| hit)
                .collect::<Vec<_>>()
        };
        assert!(during(1..=44).iter().all(|hit| !hit));
        assert!(during(45..=90).iter().any(|&hit| hit));
        assert!(during(91..=134).iter().all(|hit| !hit));
        Ok(())
    }

    #[test]
    fn detector_stops_when_flag_clears() -> Result<()> {
        let frames = vec![background(), with_block(50, 30, 50)];
        let source = Arc::new(FrameSource::with_device(Box::new(ScriptedDevice::cycling(
            frames, 20,
        )))?);
        source.start()?;

        let active = Arc::new(AtomicBool::new(true));
        let mut detector = MotionDetector::new(Arc::clone(&source), Arc::clone(&active), false, false);

        let mut last = 0;
        let mut detections = 0;
        for _ in 0..4 {
            let event = detector.next_event().expect("active detector yields events");
            assert!(event.frame_id > last);
            if event.detected {
                detections += 1;
            }
            last = event.frame_id;
        }
        assert!(detections > 0);

        active.store(false, Ordering::SeqCst);
        assert!(detector.next_event().is_none());
        source.stop()?;
        Ok(())
    }
}
