//! V4L2 capture device.
//!
//! Opens a local device node (e.g., /dev/video0), negotiates an RGB24 format
//! when the driver allows it and otherwise converts YUYV/NV12 to RGB, then
//! streams frames through memory-mapped buffers.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::CaptureDevice;
use crate::error::CameraError;
use crate::frame::Frame;

/// Configuration for a V4L2 device.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Preferred frame width. The driver may pick another size.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Number of mmap buffers queued with the driver.
    pub buffers: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            buffers: 4,
        }
    }
}

pub struct V4l2Device {
    config: V4l2Config,
    state: V4l2State,
    format: PixelFormat,
    width: u32,
    height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this>,
}

impl V4l2Device {
    /// Open the device and start streaming.
    ///
    /// Any failure here is a [`CameraError::Connection`].
    pub fn open(config: V4l2Config) -> Result<Self> {
        Self::connect(config.clone())
            .map_err(|err| CameraError::connection(config.device.clone(), format!("{:#}", err)).into())
    }

    fn connect(config: V4l2Config) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Device: failed to set RGB3 format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported pixel format {} on {}",
                format.fourcc,
                config.device
            )
        })?;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, config.buffers)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Device: connected to {} ({}x{} {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            width: format.width,
            height: format.height,
            format: pixel_format,
            config,
            state,
        })
    }
}

impl CaptureDevice for V4l2Device {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn read_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let pixels = self.state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, format)
        })?;
        Frame::from_rgb(pixels, width, height)
    }
}
