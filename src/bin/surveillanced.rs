//! surveillanced - motion-triggered camera recorder
//!
//! This daemon:
//! 1. Loads configuration (SURVEILLANCE_CONFIG file + SURVEILLANCE_* env)
//! 2. Opens the camera and probes a video codec
//! 3. Takes a photo, records a video, or watches for motion
//! 4. Writes every photo and video to the output directory
//!
//! Exit status: 1 configuration, 2 camera unreachable, 3 no video codec.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Duration;

use surveillance_camera::{exit_code_for, Camera, DaemonConfig, SurveillanceEvent};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Capture device (overrides config): N, /dev/videoN or stub://<scene>.
    #[arg(long)]
    device: Option<String>,
    /// Directory for photos and videos (overrides config).
    #[arg(long)]
    out: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Take a single photo.
    Photo,
    /// Record one video.
    Video {
        /// Length in seconds (defaults to od_video_duration).
        #[arg(long)]
        seconds: Option<f64>,
    },
    /// Watch for motion until Ctrl-C.
    Watch,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = DaemonConfig::load()?;
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(out) = args.out {
        config.output_dir = out;
    }
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("create output directory {}", config.output_dir.display())
    })?;

    let camera = Camera::open(&config.device)?;
    camera.start()?;
    // Let the fps estimate settle before it sizes any recording.
    std::thread::sleep(Duration::from_secs(1));
    log::info!(
        "surveillanced running on {} ({}x{} @ {:.1} fps), writing to {}",
        config.device,
        camera.frame_size().0,
        camera.frame_size().1,
        camera.fps(),
        config.output_dir.display()
    );

    let result = match args.command {
        Command::Photo => {
            let photo = camera.get_photo(config.settings.timestamp)?;
            let path = output_path(&config.output_dir, "photo", "jpg");
            photo.write_to(&path)?;
            log::info!("photo written to {}", path.display());
            Ok(())
        }
        Command::Video { seconds } => {
            let seconds = seconds.unwrap_or(f64::from(config.settings.od_video_duration));
            let video = camera.get_video(config.settings.timestamp, seconds)?;
            let path = persist_video(video, &config.output_dir)?;
            log::info!("video written to {}", path.display());
            Ok(())
        }
        Command::Watch => watch(&camera, &config),
    };

    camera.stop()?;
    result
}

fn watch(camera: &Camera, config: &DaemonConfig) -> Result<()> {
    let Some(stream) = camera.surveillance_start(config.settings.surveillance_options()) else {
        anyhow::bail!("surveillance could not be started");
    };

    // Ctrl-C and an ending stream both wake the main thread.
    let (tx, rx) = mpsc::channel();
    let done = tx.clone();
    let output_dir = config.output_dir.clone();
    let worker = std::thread::spawn(move || -> Result<u64> {
        let _wake = WakeOnExit(done);
        let mut events = 0u64;
        for event in stream {
            events += 1;
            match event {
                SurveillanceEvent::Detected => log::info!("motion detected"),
                SurveillanceEvent::Photo { photo, id, total } => {
                    let label = format!("motion_{}_of_{}", id, total);
                    let path = output_path(&output_dir, &label, "jpg");
                    photo.write_to(&path)?;
                    log::info!("photo {}/{} written to {}", id, total, path.display());
                }
                SurveillanceEvent::Video(video) => {
                    let path = persist_video(video, &output_dir)?;
                    log::info!("motion video written to {}", path.display());
                }
            }
        }
        Ok(events)
    });

    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("watching for motion (Ctrl-C to stop)...");
    loop {
        match rx.recv_timeout(HEALTH_LOG_INTERVAL) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => log_health(camera),
        }
    }
    if camera.is_surveillance_active() {
        log::info!("shutdown signal received, stopping surveillance...");
        camera.surveillance_stop();
    }

    let events = worker
        .join()
        .map_err(|_| anyhow::anyhow!("surveillance worker panicked"))??;
    log::info!("surveillance ended after {} events", events);
    Ok(())
}

fn log_health(camera: &Camera) {
    let stats = camera.stats();
    if camera.is_healthy() {
        log::info!(
            "{}: {} frames, {} read failures, {:.1} fps",
            stats.device,
            stats.frames_captured,
            stats.read_failures,
            stats.fps
        );
    } else {
        log::warn!(
            "{}: no frames recently ({} read failures)",
            stats.device,
            stats.read_failures
        );
    }
}

struct WakeOnExit(mpsc::Sender<()>);

impl Drop for WakeOnExit {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

fn output_path(dir: &Path, label: &str, ext: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let mut path = dir.join(format!("{}_{}.{}", stamp, label, ext));
    let mut counter = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}_{}.{}", stamp, label, counter, ext));
        counter += 1;
    }
    path
}

fn persist_video(video: surveillance_camera::VideoFile, dir: &Path) -> Result<PathBuf> {
    let name = video
        .path()
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("video.mp4"));
    video.persist(&dir.join(name))
}
