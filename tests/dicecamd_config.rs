//! Configuration loading tests.
//!
//! These mutate process environment variables, so every test takes the
//! shared lock and clears the DICECAM_* variables before it runs.

use std::io::Write;
use std::sync::Mutex;

use dicecam::config::DicecamConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_VARS: &[&str] = &[
    "DICECAM_CONFIG",
    "DICECAM_API_ADDR",
    "DICECAM_SOURCE_URL",
    "DICECAM_NUMBER_FILE",
    "DICECAM_TARGET_FPS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DicecamConfig::load().unwrap();
    assert_eq!(cfg.api_addr, "127.0.0.1:8650");
    assert_eq!(cfg.source.url, "stub://dice");
    assert_eq!(cfg.source.target_fps, 30);
    assert_eq!(cfg.source.width, 640);
    assert_eq!(cfg.source.height, 480);
    assert_eq!(cfg.mirror_path.to_str().unwrap(), "current_number.txt");
    assert_eq!(cfg.detector.min_threshold, 10);
    assert_eq!(cfg.detector.max_threshold, 200);
    assert_eq!(cfg.detector.min_area, 100.0);
}

#[test]
fn config_file_values_are_applied() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "api": {{ "addr": "127.0.0.1:9100" }},
            "source": {{ "url": "http://cam.local/stream", "target_fps": 15, "width": 320, "height": 240 }},
            "detector": {{ "min_area": 50.0, "min_circularity": 0.4 }},
            "mirror": {{ "path": "/tmp/dice-number.txt" }}
        }}"#
    )
    .unwrap();
    std::env::set_var("DICECAM_CONFIG", file.path());

    let cfg = DicecamConfig::load().unwrap();
    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.source.url, "http://cam.local/stream");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!(cfg.source.width, 320);
    assert_eq!(cfg.source.height, 240);
    assert_eq!(cfg.mirror_path.to_str().unwrap(), "/tmp/dice-number.txt");
    // Overridden detector fields change; the rest keep their defaults.
    assert_eq!(cfg.detector.min_area, 50.0);
    assert_eq!(cfg.detector.min_circularity, 0.4);
    assert_eq!(cfg.detector.min_inertia_ratio, 0.5);

    clear_env();
}

#[test]
fn env_overrides_win_over_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "api": {{ "addr": "127.0.0.1:9100" }}, "source": {{ "target_fps": 15 }} }}"#
    )
    .unwrap();
    std::env::set_var("DICECAM_CONFIG", file.path());
    std::env::set_var("DICECAM_API_ADDR", "127.0.0.1:9200");
    std::env::set_var("DICECAM_SOURCE_URL", "stub://bench");
    std::env::set_var("DICECAM_NUMBER_FILE", "/tmp/other-number.txt");
    std::env::set_var("DICECAM_TARGET_FPS", "5");

    let cfg = DicecamConfig::load().unwrap();
    assert_eq!(cfg.api_addr, "127.0.0.1:9200");
    assert_eq!(cfg.source.url, "stub://bench");
    assert_eq!(cfg.mirror_path.to_str().unwrap(), "/tmp/other-number.txt");
    assert_eq!(cfg.source.target_fps, 5);

    clear_env();
}

#[test]
fn blank_env_values_are_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DICECAM_API_ADDR", "  ");
    std::env::set_var("DICECAM_SOURCE_URL", "");

    let cfg = DicecamConfig::load().unwrap();
    assert_eq!(cfg.api_addr, "127.0.0.1:8650");
    assert_eq!(cfg.source.url, "stub://dice");

    clear_env();
}

#[test]
fn non_numeric_fps_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DICECAM_TARGET_FPS", "fast");
    let err = DicecamConfig::load().unwrap_err();
    assert!(err.to_string().contains("DICECAM_TARGET_FPS"));

    clear_env();
}

#[test]
fn invalid_detector_thresholds_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "detector": {{ "min_threshold": 200, "max_threshold": 100 }} }}"#
    )
    .unwrap();
    std::env::set_var("DICECAM_CONFIG", file.path());

    let err = DicecamConfig::load().unwrap_err();
    assert!(err.to_string().contains("min_threshold"));

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DICECAM_CONFIG", "/nonexistent/dicecam.json");
    let err = DicecamConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
