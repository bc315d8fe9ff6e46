//! Latest-frame cache fed by a dedicated capture thread.
//!
//! `FrameSource` owns the capture device. While running, one background thread
//! performs blocking device reads and swaps each new frame into a
//! mutex-guarded slot together with an incrementing `FrameId`. Readers only
//! take the lock long enough to copy the slot, so they never wait on device
//! I/O. The slot holds the freshest frame only: consumers that fall behind
//! skip frames rather than queueing them.
//!
//! A condition variable is notified on every new frame so consumers waiting
//! for "something newer than id N" wake within the same frame period instead
//! of spinning.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::CameraError;
use crate::frame::{Frame, FrameId};
use crate::ingest::{self, CaptureDevice};
use crate::overlay;

/// A source is considered unhealthy when no frame arrived for this long.
const HEALTH_GRACE: Duration = Duration::from_secs(2);

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub read_failures: u64,
    pub fps: f64,
    pub device: String,
}

struct Slot {
    frame: Frame,
    frame_id: FrameId,
    started_at: Instant,
    last_frame_at: Option<Instant>,
    read_failures: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    fresh: Condvar,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking reader cannot leave the slot half-written: every write is
        // a whole-field assignment, so the data behind a poisoned lock is intact.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Thread-safe camera front: one capture thread, any number of readers.
pub struct FrameSource {
    shared: Arc<Shared>,
    device: Mutex<Option<Box<dyn CaptureDevice>>>,
    worker: Mutex<Option<JoinHandle<Box<dyn CaptureDevice>>>>,
    device_name: String,
    frame_size: (u32, u32),
}

impl FrameSource {
    /// Open a device by identifier (see [`ingest::open_device`]).
    pub fn open(device: &str) -> Result<Self> {
        let device = ingest::open_device(device)?;
        Self::with_device(device)
    }

    /// Wrap an already-open device.
    ///
    /// One frame is read synchronously to fix the frame geometry; failing to
    /// get it is a [`CameraError::Connection`].
    pub fn with_device(mut device: Box<dyn CaptureDevice>) -> Result<Self> {
        let device_name = device.name().to_string();
        let first = device
            .read_frame()
            .map_err(|err| CameraError::connection(device_name.clone(), format!("{:#}", err)))?;
        let frame_size = first.size();
        log::info!(
            "FrameSource: {} delivers {}x{} frames",
            device_name,
            frame_size.0,
            frame_size.1
        );

        Ok(Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    frame: first,
                    frame_id: 0,
                    started_at: Instant::now(),
                    last_frame_at: None,
                    read_failures: 0,
                }),
                fresh: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            device: Mutex::new(Some(device)),
            worker: Mutex::new(None),
            device_name,
            frame_size,
        })
    }

    /// Start the capture thread. No-op when already running.
    ///
    /// Resets the frame counter and the fps reference time.
    pub fn start(&self) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| anyhow!("frame source worker lock poisoned"))?;
        if worker.is_some() {
            log::debug!("FrameSource: {} already running", self.device_name);
            return Ok(());
        }
        let device = self
            .device
            .lock()
            .map_err(|_| anyhow!("frame source device lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("capture device for {} is gone", self.device_name))?;

        {
            let mut slot = self.shared.lock();
            slot.frame_id = 0;
            slot.started_at = Instant::now();
            slot.last_frame_at = None;
        }
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let frame_size = self.frame_size;
        let handle = std::thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || capture_loop(device, shared, frame_size))
            .context("spawn capture thread")?;
        *worker = Some(handle);

        log::info!("FrameSource: capture started on {}", self.device_name);
        Ok(())
    }

    /// Stop the capture thread and wait for it to exit. No-op when stopped.
    ///
    /// After this returns the device is no longer read; it stays owned by the
    /// source so `start` may be called again.
    pub fn stop(&self) -> Result<()> {
        let handle = self
            .worker
            .lock()
            .map_err(|_| anyhow!("frame source worker lock poisoned"))?
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.fresh.notify_all();
        let device = handle
            .join()
            .map_err(|_| anyhow!("capture thread for {} panicked", self.device_name))?;
        *self
            .device
            .lock()
            .map_err(|_| anyhow!("frame source device lock poisoned"))? = Some(device);

        log::info!("FrameSource: capture stopped on {}", self.device_name);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Copy of the latest frame and its id, stamped with the local time when
    /// `timestamp` is set. The stamp is drawn outside the lock.
    pub fn read(&self, timestamp: bool) -> (FrameId, Frame) {
        let (frame_id, mut frame) = {
            let slot = self.shared.lock();
            (slot.frame_id, slot.frame.clone())
        };
        if timestamp {
            overlay::stamp_timestamp(&mut frame);
        }
        (frame_id, frame)
    }

    /// Like [`read`](Self::read), but first waits up to `timeout` for a frame
    /// with an id greater than `last_id`.
    ///
    /// Returns `None` on timeout or when the source stops, so callers can check
    /// their own cancellation flags between waits.
    pub fn read_newer(
        &self,
        last_id: FrameId,
        timestamp: bool,
        timeout: Duration,
    ) -> Option<(FrameId, Frame)> {
        let (frame_id, mut frame) = {
            let slot = self.shared.lock();
            let (slot, _) = self
                .shared
                .fresh
                .wait_timeout_while(slot, timeout, |slot| {
                    slot.frame_id <= last_id && self.shared.running.load(Ordering::SeqCst)
                })
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if slot.frame_id <= last_id {
                return None;
            }
            (slot.frame_id, slot.frame.clone())
        };
        if timestamp {
            overlay::stamp_timestamp(&mut frame);
        }
        Some((frame_id, frame))
    }

    /// Capture rate measured since `start`: frames captured / elapsed seconds.
    ///
    /// Unstable right after `start`; 0 while stopped or before any frame.
    pub fn fps(&self) -> f64 {
        if !self.is_running() {
            return 0.0;
        }
        let slot = self.shared.lock();
        let elapsed = slot.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        slot.frame_id as f64 / elapsed
    }

    /// `(width, height)` fixed at open time.
    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_healthy(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        let slot = self.shared.lock();
        match slot.last_frame_at {
            Some(at) => at.elapsed() <= HEALTH_GRACE,
            None => slot.started_at.elapsed() <= HEALTH_GRACE,
        }
    }

    pub fn stats(&self) -> SourceStats {
        let (frames_captured, read_failures) = {
            let slot = self.shared.lock();
            (slot.frame_id, slot.read_failures)
        };
        SourceStats {
            frames_captured,
            read_failures,
            fps: self.fps(),
            device: self.device_name.clone(),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("FrameSource: {}", err);
        }
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    shared: Arc<Shared>,
    frame_size: (u32, u32),
) -> Box<dyn CaptureDevice> {
    let mut failing = false;
    while shared.running.load(Ordering::SeqCst) {
        // The device read happens outside the lock.
        let result = device.read_frame().and_then(|frame| {
            if frame.size() == frame_size {
                Ok(frame)
            } else {
                Err(anyhow!(
                    "frame size changed to {}x{}",
                    frame.width(),
                    frame.height()
                ))
            }
        });

        match result {
            Ok(frame) => {
                if failing {
                    log::info!("FrameSource: {} recovered", device.name());
                    failing = false;
                }
                let mut slot = shared.lock();
                slot.frame = frame;
                slot.frame_id += 1;
                slot.last_frame_at = Some(Instant::now());
                drop(slot);
                shared.fresh.notify_all();
            }
            Err(err) => {
                if !failing {
                    log::warn!(
                        "FrameSource: read failed on {}, keeping previous frame: {:#}",
                        device.name(),
                        err
                    );
                    failing = true;
                }
                shared.lock().read_failures += 1;
                // Avoid a hot loop on a device that fails without blocking.
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
    device
}
