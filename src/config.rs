use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::surveillance::SurveillanceOptions;

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_OUTPUT_DIR: &str = "captures";
const DEFAULT_TIMESTAMP: bool = true;
const DEFAULT_OD_VIDEO_SECS: u32 = 5;
const DEFAULT_SRV_VIDEO_SECS: u32 = 30;
const DEFAULT_SRV_PICTURE_SECS: u32 = 5;
const DEFAULT_SRV_CONTOURS: bool = true;

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    device: Option<String>,
    output_dir: Option<PathBuf>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    timestamp: Option<bool>,
    od_video_duration: Option<u32>,
    srv_video_duration: Option<u32>,
    srv_picture_interval: Option<u32>,
    srv_motion_contours: Option<bool>,
}

/// User-tunable capture behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Stamp the local time onto photos and video frames.
    pub timestamp: bool,
    /// On-demand video length, seconds.
    pub od_video_duration: u32,
    /// Motion video length, seconds.
    pub srv_video_duration: u32,
    /// Seconds between photos during a motion video.
    pub srv_picture_interval: u32,
    /// Outline moving regions in surveillance output.
    pub srv_motion_contours: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            timestamp: DEFAULT_TIMESTAMP,
            od_video_duration: DEFAULT_OD_VIDEO_SECS,
            srv_video_duration: DEFAULT_SRV_VIDEO_SECS,
            srv_picture_interval: DEFAULT_SRV_PICTURE_SECS,
            srv_motion_contours: DEFAULT_SRV_CONTOURS,
        }
    }
}

impl CaptureSettings {
    pub fn surveillance_options(&self) -> SurveillanceOptions {
        SurveillanceOptions {
            timestamp: self.timestamp,
            video_seconds: f64::from(self.srv_video_duration),
            picture_seconds: f64::from(self.srv_picture_interval),
            draw_contours: self.srv_motion_contours,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.od_video_duration == 0 {
            return Err(anyhow!("od_video_duration must be greater than zero"));
        }
        if self.srv_video_duration == 0 {
            return Err(anyhow!("srv_video_duration must be greater than zero"));
        }
        if self.srv_picture_interval == 0 {
            return Err(anyhow!("srv_picture_interval must be greater than zero"));
        }
        if self.srv_picture_interval > self.srv_video_duration {
            return Err(anyhow!(
                "srv_picture_interval ({}) must not exceed srv_video_duration ({})",
                self.srv_picture_interval,
                self.srv_video_duration
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub device: String,
    pub output_dir: PathBuf,
    pub settings: CaptureSettings,
}

impl DaemonConfig {
    /// Defaults, then the file named by `SURVEILLANCE_CONFIG`, then
    /// `SURVEILLANCE_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SURVEILLANCE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let device = file.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string());
        let output_dir = file
            .output_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let capture = file.capture.unwrap_or_default();
        let settings = CaptureSettings {
            timestamp: capture.timestamp.unwrap_or(DEFAULT_TIMESTAMP),
            od_video_duration: capture.od_video_duration.unwrap_or(DEFAULT_OD_VIDEO_SECS),
            srv_video_duration: capture.srv_video_duration.unwrap_or(DEFAULT_SRV_VIDEO_SECS),
            srv_picture_interval: capture
                .srv_picture_interval
                .unwrap_or(DEFAULT_SRV_PICTURE_SECS),
            srv_motion_contours: capture.srv_motion_contours.unwrap_or(DEFAULT_SRV_CONTOURS),
        };
        Self {
            device,
            output_dir,
            settings,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SURVEILLANCE_DEVICE") {
            if !device.trim().is_empty() {
                self.device = device.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var("SURVEILLANCE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output_dir = PathBuf::from(dir);
            }
        }
        if let Some(value) = env_bool("SURVEILLANCE_TIMESTAMP")? {
            self.settings.timestamp = value;
        }
        if let Some(value) = env_bool("SURVEILLANCE_CONTOURS")? {
            self.settings.srv_motion_contours = value;
        }
        if let Some(value) = env_seconds("SURVEILLANCE_OD_VIDEO_SECONDS")? {
            self.settings.od_video_duration = value;
        }
        if let Some(value) = env_seconds("SURVEILLANCE_VIDEO_SECONDS")? {
            self.settings.srv_video_duration = value;
        }
        if let Some(value) = env_seconds("SURVEILLANCE_PICTURE_INTERVAL")? {
            self.settings.srv_picture_interval = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(anyhow!("device must not be empty"));
        }
        self.settings.validate()
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(anyhow!("{} must be a boolean, got {:?}", key, value)),
    }
}

fn env_seconds(key: &str) -> Result<Option<u32>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    if value.trim().is_empty() {
        return Ok(None);
    }
    let seconds = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of seconds", key))?;
    Ok(Some(seconds))
}
