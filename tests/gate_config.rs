use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use selfie_gate::{GateConfig, SnapshotFormat};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SELFIE_GATE_CONFIG",
        "SELFIE_GATE_BACKEND_URL",
        "SELFIE_GATE_TIMEOUT_SECS",
        "SELFIE_GATE_CAMERA",
        "SELFIE_GATE_PROGRESS_MS",
        "SELFIE_GATE_SNAPSHOT_FORMAT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "backend": {
            "base_url": "https://gate.example.org",
            "timeout_secs": 12
        },
        "camera": {
            "url": "stub://lobby",
            "width": 320,
            "height": 240
        },
        "progress": {
            "interval_ms": 250,
            "messages": ["one", "two"]
        },
        "snapshot": {
            "format": "jpeg"
        }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("SELFIE_GATE_CONFIG", file.path());
    std::env::set_var("SELFIE_GATE_CAMERA", "stub://kiosk");
    std::env::set_var("SELFIE_GATE_PROGRESS_MS", "500");

    let cfg = GateConfig::load().expect("load config");

    assert_eq!(cfg.backend.base_url, "https://gate.example.org");
    assert_eq!(cfg.backend.timeout, Duration::from_secs(12));
    assert_eq!(cfg.camera.url, "stub://kiosk");
    assert_eq!(cfg.camera.width, 320);
    assert_eq!(cfg.camera.height, 240);
    assert_eq!(cfg.progress.interval, Duration::from_millis(500));
    assert_eq!(cfg.progress.messages, vec!["one", "two"]);
    assert_eq!(cfg.snapshot_format, SnapshotFormat::Jpeg);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [backend]
        base_url = "http://10.0.0.5:8000"

        [camera]
        url = "http://10.0.0.9/capture"
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = GateConfig::load_from(Some(file.path())).expect("load config");

    assert_eq!(cfg.backend.base_url, "http://10.0.0.5:8000");
    assert_eq!(cfg.backend.timeout, Duration::from_secs(30));
    assert_eq!(cfg.camera.url, "http://10.0.0.9/capture");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.snapshot_format, SnapshotFormat::Png);

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = GateConfig::load().expect("load defaults");

    assert_eq!(cfg.backend.base_url, "http://localhost:8000");
    assert_eq!(cfg.camera.url, "stub://front_camera");
    assert_eq!(cfg.progress.interval, Duration::from_secs(1));
    assert_eq!(cfg.progress.messages.len(), 7);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SELFIE_GATE_TIMEOUT_SECS", "soon");
    assert!(GateConfig::load().is_err());
    clear_env();

    std::env::set_var("SELFIE_GATE_PROGRESS_MS", "0");
    assert!(GateConfig::load().is_err());
    clear_env();

    std::env::set_var("SELFIE_GATE_BACKEND_URL", "ftp://backend");
    assert!(GateConfig::load().is_err());
    clear_env();

    std::env::set_var("SELFIE_GATE_SNAPSHOT_FORMAT", "gif");
    assert!(GateConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_empty_message_list() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{"progress": {"messages": []}}"#)
        .expect("write config");

    assert!(GateConfig::load_from(Some(file.path())).is_err());
}
