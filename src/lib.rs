//! Surveillance camera core.
//!
//! Captures frames from a local camera, serves photos and fixed-length videos
//! on demand, and runs a motion-triggered surveillance mode that records a
//! video with periodic stills whenever something moves in the scene.
//!
//! # Architecture
//!
//! 1. **Capture**: one background thread per device keeps only the freshest
//!    frame, tagged with an increasing `FrameId`.
//! 2. **Detection**: consecutive distinct frames are differenced, blurred,
//!    thresholded and closed; large enough regions count as motion.
//! 3. **Recording**: a codec is probed once per camera; sessions collect
//!    distinct frames until the duration, measured in frames at the live
//!    frame rate, is covered.
//! 4. **Surveillance**: a pull-based state machine turns motion into
//!    `Detected`, `Photo` and `Video` events.
//!
//! # Module Structure
//!
//! - `camera`: the `Camera` facade used by front ends
//! - `source`: `FrameSource`, the latest-frame cache and capture thread
//! - `ingest`: capture devices (V4L2, synthetic `stub://` scenes)
//! - `detect`: image filters, contour extraction, `MotionDetector`
//! - `record`: codec probing, recording sessions, encoder backends
//! - `surveillance`: `SurveillanceOrchestrator` and its events
//! - `config`: capture settings and daemon configuration
//! - `error`: failure kinds with distinct exit codes

pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod media;
pub mod overlay;
pub mod record;
pub mod source;
pub mod surveillance;

pub use camera::Camera;
pub use config::{CaptureSettings, DaemonConfig};
pub use detect::{MotionAnalyzer, MotionDetector, MotionEvent};
pub use error::{exit_code_for, CameraError};
pub use frame::{Frame, FrameId};
pub use ingest::CaptureDevice;
pub use media::{Photo, VideoFile};
pub use record::{Codec, Recorder, RecordingSession, SessionTag, VideoBackend, VideoWriter};
pub use source::{FrameSource, SourceStats};
pub use surveillance::{SurveillanceEvent, SurveillanceOptions, SurveillanceOrchestrator};
