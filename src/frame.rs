//! Captured frames.
//!
//! - `Frame`: one RGB24 image as delivered by a capture device.
//! - `FrameId`: sequence number assigned by the frame source.
//!
//! Frames are plain owned buffers. The frame source hands out copies, so every
//! consumer may annotate its own frame without affecting anyone else.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Rgb, RgbImage};

/// Sequence number of a captured frame. Starts at 0 and increases by one per
/// successful device read while the source is running.
pub type FrameId = u64;

/// JPEG quality used for photos.
pub const JPEG_QUALITY: u8 = 95;

/// One captured image, 8-bit RGB, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap a raw RGB24 buffer. Fails when the buffer does not match the geometry.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("invalid {}x{} frame", width, height))?;
        Ok(Self { image })
    }

    /// A frame of a single solid color.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Set one pixel, silently ignoring coordinates outside the frame.
    pub fn put_pixel(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return;
        }
        self.image.put_pixel(x as u32, y as u32, Rgb(color));
    }

    /// Fill an axis-aligned block, clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) {
        let x_end = x.saturating_add(width).min(self.width());
        let y_end = y.saturating_add(height).min(self.height());
        for yy in y..y_end {
            for xx in x..x_end {
                self.image.put_pixel(xx, yy, Rgb(color));
            }
        }
    }

    /// Luma plane using the BT.601 weights (fixed point, rounded).
    pub fn to_gray(&self) -> GrayImage {
        let (width, height) = self.size();
        let mut gray = GrayImage::new(width, height);
        for (dst, src) in gray.iter_mut().zip(self.image.as_raw().chunks_exact(3)) {
            let r = src[0] as u32;
            let g = src[1] as u32;
            let b = src[2] as u32;
            *dst = ((r * 4899 + g * 9617 + b * 1868 + 8192) >> 14) as u8;
        }
        gray
    }

    /// Planar YUV 4:2:0 (BT.601, limited range) as `[Y, U, V]` planes.
    ///
    /// Chroma planes are `ceil(w/2) x ceil(h/2)`; each sample averages the
    /// covered 2x2 block.
    pub fn to_yuv420p(&self) -> [Vec<u8>; 3] {
        let (width, height) = (self.width() as usize, self.height() as usize);
        let (cw, ch) = ((width + 1) / 2, (height + 1) / 2);
        let rgb = self.image.as_raw();

        let mut y_plane = Vec::with_capacity(width * height);
        for px in rgb.chunks_exact(3) {
            let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
            y_plane.push((((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8);
        }

        let mut u_plane = Vec::with_capacity(cw * ch);
        let mut v_plane = Vec::with_capacity(cw * ch);
        for cy in 0..ch {
            for cx in 0..cw {
                let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
                for y in (cy * 2)..(cy * 2 + 2).min(height) {
                    for x in (cx * 2)..(cx * 2 + 2).min(width) {
                        let i = (y * width + x) * 3;
                        r += rgb[i] as i32;
                        g += rgb[i + 1] as i32;
                        b += rgb[i + 2] as i32;
                        n += 1;
                    }
                }
                let (r, g, b) = (r / n, g / n, b / n);
                u_plane.push((((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8);
                v_plane.push((((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8);
            }
        }
        [y_plane, u_plane, v_plane]
    }

    /// Encode as a baseline JPEG byte stream.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode_image(&self.image)
            .context("encode jpeg")?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2).is_err());
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn gray_conversion_uses_luma_weights() -> Result<()> {
        let frame = Frame::from_rgb(vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 200, 200, 200], 4, 1)?;
        let gray = frame.to_gray();
        assert_eq!(gray.as_raw(), &vec![76, 150, 29, 200]);
        Ok(())
    }

    #[test]
    fn jpeg_round_trips_geometry() -> Result<()> {
        let mut frame = Frame::filled(64, 48, [10, 20, 30]);
        frame.fill_rect(8, 8, 16, 16, [250, 250, 250]);
        let jpeg = frame.encode_jpeg()?;
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg)?;
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
        Ok(())
    }

    #[test]
    fn yuv_planes_use_studio_range() -> Result<()> {
        let [y, u, v] = Frame::filled(4, 2, [255, 255, 255]).to_yuv420p();
        assert_eq!(y, vec![235; 8]);
        assert_eq!(u, vec![128; 2]);
        assert_eq!(v, vec![128; 2]);

        let [y, u, v] = Frame::filled(3, 3, [0, 0, 0]).to_yuv420p();
        assert_eq!(y.len(), 9);
        assert!(y.iter().all(|&p| p == 16));
        assert_eq!((u.len(), v.len()), (4, 4));

        // Pure red: low U, high V.
        let [_, u, v] = Frame::from_rgb(vec![255, 0, 0, 255, 0, 0], 2, 1)?.to_yuv420p();
        assert_eq!(u, vec![90]);
        assert_eq!(v, vec![240]);
        Ok(())
    }

    #[test]
    fn put_pixel_clips() {
        let mut frame = Frame::filled(2, 2, [0, 0, 0]);
        frame.put_pixel(-1, 0, [255, 255, 255]);
        frame.put_pixel(2, 1, [255, 255, 255]);
        assert!(frame.pixels().iter().all(|&p| p == 0));
        frame.put_pixel(1, 1, [255, 255, 255]);
        assert_eq!(&frame.pixels()[9..12], &[255, 255, 255]);
    }
}
