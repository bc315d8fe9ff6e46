//! MP4 encoding using FFmpeg.
//!
//! Frames arrive as packed RGB24, are converted to planar YUV420P in Rust
//! (no swscale context, so the writer can move between threads), and are
//! muxed into an MP4 container with a constant frame rate.

use anyhow::{anyhow, bail, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;

use super::{Codec, VideoBackend, VideoWriter};
use crate::frame::Frame;

pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        Ok(Self)
    }
}

fn codec_id(codec: Codec) -> ffmpeg::codec::Id {
    match codec {
        Codec::Avc1 => ffmpeg::codec::Id::H264,
        Codec::Mp4v => ffmpeg::codec::Id::MPEG4,
    }
}

impl VideoBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(
        &self,
        path: &Path,
        codec: Codec,
        fps: f64,
        frame_size: (u32, u32),
    ) -> Result<Box<dyn VideoWriter>> {
        Ok(Box::new(FfmpegWriter::new(path, codec, fps, frame_size)?))
    }
}

struct FfmpegWriter {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    pts: i64,
}

impl FfmpegWriter {
    fn new(path: &Path, codec: Codec, fps: f64, frame_size: (u32, u32)) -> Result<Self> {
        let (width, height) = frame_size;
        // Containers want an integral rate.
        let rate = (fps.round() as i32).max(1);

        let encoder_codec = ffmpeg::encoder::find(codec_id(codec))
            .ok_or_else(|| anyhow!("no ffmpeg encoder for {}", codec))?;
        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("create output {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::flag::Flags::GLOBAL_HEADER);

        let mut stream = output
            .add_stream(encoder_codec)
            .context("add video stream")?;
        let stream_index = stream.index();

        let mut config = ffmpeg::codec::context::Context::new_with_codec(encoder_codec)
            .encoder()
            .video()
            .context("create video encoder")?;
        config.set_width(width);
        config.set_height(height);
        config.set_format(ffmpeg::format::Pixel::YUV420P);
        config.set_time_base(ffmpeg::Rational(1, rate));
        config.set_frame_rate(Some(ffmpeg::Rational(rate, 1)));
        if global_header {
            config.set_flags(ffmpeg::codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = config
            .open_as(encoder_codec)
            .with_context(|| format!("open {} encoder", codec))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(ffmpeg::Rational(1, rate));

        output.write_header().context("write container header")?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| anyhow!("video stream vanished after header"))?;

        Ok(Self {
            output,
            encoder,
            stream_index,
            encoder_time_base: ffmpeg::Rational(1, rate),
            stream_time_base,
            width,
            height,
            pts: 0,
        })
    }

    fn drain(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write video packet")?;
        }
        Ok(())
    }
}

impl VideoWriter for FfmpegWriter {
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

        let mut yuv =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::YUV420P, self.width, self.height);
        let (w, h) = (self.width as usize, self.height as usize);
        let plane_sizes = [(w, h), ((w + 1) / 2, (h + 1) / 2), ((w + 1) / 2, (h + 1) / 2)];
        for (index, (plane, (pw, ph))) in frame.to_yuv420p().iter().zip(plane_sizes).enumerate() {
            let stride = yuv.stride(index);
            let data = yuv.data_mut(index);
            for (row, src) in plane.chunks_exact(pw).take(ph).enumerate() {
                data[row * stride..row * stride + pw].copy_from_slice(src);
            }
        }
        yuv.set_pts(Some(self.pts));
        self.pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to encoder")?;
        self.drain()
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.encoder.send_eof().context("flush encoder")?;
        self.drain()?;
        self.output
            .write_trailer()
            .context("write container trailer")?;
        Ok(())
    }
}
