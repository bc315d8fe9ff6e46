use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::Builder;

use surveillance_camera::config::DaemonConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SURVEILLANCE_CONFIG",
        "SURVEILLANCE_DEVICE",
        "SURVEILLANCE_OUTPUT_DIR",
        "SURVEILLANCE_TIMESTAMP",
        "SURVEILLANCE_VIDEO_SECONDS",
        "SURVEILLANCE_PICTURE_INTERVAL",
        "SURVEILLANCE_CONTOURS",
        "SURVEILLANCE_OD_VIDEO_SECONDS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "device": "2",
        "output_dir": "/var/lib/surveillance",
        "capture": {
            "timestamp": false,
            "od_video_duration": 8,
            "srv_video_duration": 20,
            "srv_picture_interval": 4,
            "srv_motion_contours": false
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SURVEILLANCE_CONFIG", file.path());
    std::env::set_var("SURVEILLANCE_VIDEO_SECONDS", "40");
    std::env::set_var("SURVEILLANCE_CONTOURS", "yes");

    let cfg = DaemonConfig::load().expect("load config");

    assert_eq!(cfg.device, "2");
    assert_eq!(cfg.output_dir, PathBuf::from("/var/lib/surveillance"));
    assert!(!cfg.settings.timestamp);
    assert_eq!(cfg.settings.od_video_duration, 8);
    assert_eq!(cfg.settings.srv_video_duration, 40);
    assert_eq!(cfg.settings.srv_picture_interval, 4);
    assert!(cfg.settings.srv_motion_contours);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
        device = "stub://motion"

        [capture]
        srv_video_duration = 10
        srv_picture_interval = 2
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SURVEILLANCE_CONFIG", file.path());
    std::env::set_var("SURVEILLANCE_DEVICE", "stub://burst");

    let cfg = DaemonConfig::load().expect("load config");
    assert_eq!(cfg.device, "stub://burst");
    assert_eq!(cfg.output_dir, PathBuf::from("captures"));
    assert_eq!(cfg.settings.srv_video_duration, 10);
    assert_eq!(cfg.settings.srv_picture_interval, 2);
    assert_eq!(cfg.settings.od_video_duration, 5);
    assert!(cfg.settings.timestamp);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SURVEILLANCE_PICTURE_INTERVAL", "60");
    let err = DaemonConfig::load().expect_err("interval longer than video");
    assert!(err.to_string().contains("srv_picture_interval"));

    std::env::set_var("SURVEILLANCE_PICTURE_INTERVAL", "five");
    assert!(DaemonConfig::load().is_err());

    clear_env();
    std::env::set_var("SURVEILLANCE_TIMESTAMP", "maybe");
    assert!(DaemonConfig::load().is_err());

    clear_env();
}

#[test]
fn defaults_without_any_configuration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DaemonConfig::load().expect("defaults load");
    assert_eq!(cfg.device, "/dev/video0");
    assert_eq!(cfg.settings.srv_video_duration, 30);
    assert_eq!(cfg.settings.srv_picture_interval, 5);
    assert!(cfg.settings.srv_motion_contours);
}
