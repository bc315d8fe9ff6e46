//! Synthetic capture devices for tests and demos.
//!
//! `stub://` identifiers select a generated scene:
//! - `stub://static`: a fixed gradient, never any motion
//! - `stub://motion`: a bright block sweeping across a dark scene, motion on every frame
//! - `stub://burst`: alternates between a still scene and a moving block
//! - `stub://offline`: refuses to open
//!
//! Optional query parameters override the geometry and pacing, e.g.
//! `stub://motion?fps=60&width=320&height=240`.
//!
//! `ScriptedDevice` replays a fixed list of frames (and injected read
//! failures) for deterministic tests.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::CaptureDevice;
use crate::error::CameraError;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 160;
const DEFAULT_HEIGHT: u32 = 120;
const DEFAULT_FPS: u32 = 30;
const BLOCK_SIZE: u32 = 40;
const BLOCK_STEP: u32 = 6;
/// Frames per still/moving phase of the burst scene.
const BURST_PHASE_FRAMES: u64 = 45;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticScene {
    Static,
    Motion,
    Burst,
    Offline,
}

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub scene: SyntheticScene,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            scene: SyntheticScene::Static,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

impl SyntheticConfig {
    /// Parse a `stub://scene?key=value&...` identifier.
    pub fn parse(device: &str) -> Result<Self> {
        let rest = device
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("not a stub device: {}", device))?;
        let (scene, query) = match rest.split_once('?') {
            Some((scene, query)) => (scene, Some(query)),
            None => (rest, None),
        };
        let scene = match scene {
            "" | "static" => SyntheticScene::Static,
            "motion" => SyntheticScene::Motion,
            "burst" => SyntheticScene::Burst,
            "offline" => SyntheticScene::Offline,
            other => return Err(anyhow!("unknown stub scene '{}'", other)),
        };

        let mut config = Self {
            scene,
            ..Self::default()
        };
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value: u32 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter {} must be an integer", key))?;
            match key {
                "fps" => config.fps = value,
                "width" => config.width = value,
                "height" => config.height = value,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if config.width == 0 || config.height == 0 || config.fps == 0 {
            return Err(anyhow!("stub geometry and fps must be non-zero"));
        }
        Ok(config)
    }

    fn identifier(&self) -> String {
        let scene = match self.scene {
            SyntheticScene::Static => "static",
            SyntheticScene::Motion => "motion",
            SyntheticScene::Burst => "burst",
            SyntheticScene::Offline => "offline",
        };
        format!("stub://{}", scene)
    }
}

/// Generated scene paced at the configured frame rate.
pub struct SyntheticDevice {
    config: SyntheticConfig,
    name: String,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticDevice {
    pub fn open(config: SyntheticConfig) -> Result<Self> {
        let name = config.identifier();
        if config.scene == SyntheticScene::Offline {
            return Err(CameraError::connection(name, "synthetic device is offline").into());
        }
        log::info!(
            "SyntheticDevice: opened {} ({}x{} @ {} fps)",
            name,
            config.width,
            config.height,
            config.fps
        );
        Ok(Self {
            config,
            name,
            frame_count: 0,
            last_frame_at: None,
        })
    }

    fn pace(&mut self) {
        let interval = Duration::from_secs_f64(1.0 / self.config.fps as f64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn render(&self) -> Frame {
        let SyntheticConfig { width, height, .. } = self.config;
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let shade = (40 + (x * 60 / width) + (y * 40 / height)) as u8;
                pixels.extend_from_slice(&[shade, shade, shade]);
            }
        }
        let mut frame = match Frame::from_rgb(pixels, width, height) {
            Ok(frame) => frame,
            Err(_) => Frame::filled(width, height, [40, 40, 40]),
        };

        let moving = match self.config.scene {
            SyntheticScene::Motion => true,
            SyntheticScene::Burst => (self.frame_count / BURST_PHASE_FRAMES) % 2 == 1,
            SyntheticScene::Static | SyntheticScene::Offline => false,
        };
        if moving {
            let span = width.saturating_sub(BLOCK_SIZE).max(1) as u64;
            let x = ((self.frame_count * BLOCK_STEP as u64) % span) as u32;
            let y = height.saturating_sub(BLOCK_SIZE) / 2;
            frame.fill_rect(x, y, BLOCK_SIZE, BLOCK_SIZE, [240, 240, 240]);
        }
        frame
    }
}

impl CaptureDevice for SyntheticDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.pace();
        let frame = self.render();
        self.frame_count += 1;
        Ok(frame)
    }
}

/// One step of a scripted capture.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Frame(Frame),
    Fail,
}

/// Replays a script of frames and failures, cycling when it reaches the end.
pub struct ScriptedDevice {
    steps: Vec<ScriptStep>,
    position: usize,
    interval: Duration,
    last_frame_at: Option<Instant>,
}

impl ScriptedDevice {
    pub fn new(steps: Vec<ScriptStep>, fps: u32) -> Self {
        Self {
            steps,
            position: 0,
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            last_frame_at: None,
        }
    }

    /// Script that cycles through `frames` without failures.
    pub fn cycling(frames: Vec<Frame>, fps: u32) -> Self {
        Self::new(frames.into_iter().map(ScriptStep::Frame).collect(), fps)
    }
}

impl CaptureDevice for ScriptedDevice {
    fn name(&self) -> &str {
        "stub://scripted"
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());

        if self.steps.is_empty() {
            return Err(anyhow!("scripted device has no frames"));
        }
        let step = self.steps[self.position % self.steps.len()].clone();
        self.position += 1;
        match step {
            ScriptStep::Frame(frame) => Ok(frame),
            ScriptStep::Fail => Err(anyhow!("scripted read failure")),
        }
    }
}
