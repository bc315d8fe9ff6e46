//! Capture devices.
//!
//! A `CaptureDevice` performs blocking reads of whole frames. The frame source
//! owns exactly one device and drives it from its capture thread; nothing else
//! ever touches the device.
//!
//! Device identifiers:
//! - `N` (an integer): the local V4L2 node `/dev/videoN` (feature: ingest-v4l2)
//! - `/dev/...`: a V4L2 device node (feature: ingest-v4l2)
//! - `stub://<scene>`: synthetic scene, see [`synthetic`]

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::Frame;

pub use synthetic::{ScriptStep, ScriptedDevice, SyntheticConfig, SyntheticDevice, SyntheticScene};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Device};

/// A physical or simulated camera.
pub trait CaptureDevice: Send {
    /// Human-readable device identifier for logs.
    fn name(&self) -> &str;

    /// Block until the device delivers the next frame.
    ///
    /// An error means this single read failed; the device may still deliver
    /// frames on later calls.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Open the device named by `device`.
///
/// Failure to open is reported as [`CameraError::Connection`](crate::error::CameraError::Connection).
pub fn open_device(device: &str) -> Result<Box<dyn CaptureDevice>> {
    let device = normalize_device_id(device);
    if device.starts_with("stub://") {
        let config = SyntheticConfig::parse(&device)?;
        return Ok(Box::new(SyntheticDevice::open(config)?));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        let config = V4l2Config {
            device,
            ..V4l2Config::default()
        };
        Ok(Box::new(V4l2Device::open(config)?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(crate::error::CameraError::connection(
            device,
            "local devices require the ingest-v4l2 feature",
        )
        .into())
    }
}

/// Integer ids are shorthand for `/dev/videoN`.
pub fn normalize_device_id(device: &str) -> String {
    let trimmed = device.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{}", trimmed)
    } else {
        trimmed.to_string()
    }
}
