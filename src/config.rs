use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::announcer::DEFAULT_MESSAGES;
use crate::camera::CameraSettings;
use crate::snapshot::SnapshotFormat;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CAMERA_URL: &str = "stub://front_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_PROGRESS_MS: u64 = 1000;

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    backend: Option<BackendConfigFile>,
    camera: Option<CameraConfigFile>,
    progress: Option<ProgressConfigFile>,
    snapshot: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ProgressConfigFile {
    interval_ms: Option<u64>,
    messages: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigFile {
    format: Option<SnapshotFormat>,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub backend: BackendSettings,
    pub camera: CameraSettings,
    pub progress: ProgressSettings,
    pub snapshot_format: SnapshotFormat,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ProgressSettings {
    pub interval: Duration,
    pub messages: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from_file(GateConfigFile::default())
    }
}

impl GateConfig {
    /// File named by `SELFIE_GATE_CONFIG` (JSON, or TOML by extension),
    /// then `SELFIE_GATE_*` env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SELFIE_GATE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as `load`, with an explicit config file instead of the env var.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GateConfigFile) -> Self {
        let backend = BackendSettings {
            base_url: file
                .backend
                .as_ref()
                .and_then(|backend| backend.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            timeout: Duration::from_secs(
                file.backend
                    .as_ref()
                    .and_then(|backend| backend.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        };
        let camera = CameraSettings {
            url: file
                .camera
                .as_ref()
                .and_then(|camera| camera.url.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };
        let progress = ProgressSettings {
            interval: Duration::from_millis(
                file.progress
                    .as_ref()
                    .and_then(|progress| progress.interval_ms)
                    .unwrap_or(DEFAULT_PROGRESS_MS),
            ),
            messages: file
                .progress
                .and_then(|progress| progress.messages)
                .unwrap_or_else(|| DEFAULT_MESSAGES.iter().map(|m| m.to_string()).collect()),
        };
        let snapshot_format = file
            .snapshot
            .and_then(|snapshot| snapshot.format)
            .unwrap_or_default();
        Self {
            backend,
            camera,
            progress,
            snapshot_format,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SELFIE_GATE_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend.base_url = url;
            }
        }
        if let Ok(timeout) = std::env::var("SELFIE_GATE_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("SELFIE_GATE_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.backend.timeout = Duration::from_secs(seconds);
        }
        if let Ok(camera) = std::env::var("SELFIE_GATE_CAMERA") {
            if !camera.trim().is_empty() {
                self.camera.url = camera;
            }
        }
        if let Ok(interval) = std::env::var("SELFIE_GATE_PROGRESS_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("SELFIE_GATE_PROGRESS_MS must be an integer number of milliseconds")
            })?;
            self.progress.interval = Duration::from_millis(ms);
        }
        if let Ok(format) = std::env::var("SELFIE_GATE_SNAPSHOT_FORMAT") {
            if !format.trim().is_empty() {
                self.snapshot_format = format.parse()?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.backend.base_url)
            .map_err(|e| anyhow!("invalid backend url '{}': {}", self.backend.base_url, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!("backend url must use http or https"));
        }
        if self.backend.timeout.is_zero() {
            return Err(anyhow!("backend timeout must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.progress.interval.is_zero() {
            return Err(anyhow!("progress interval must be greater than zero"));
        }
        if self.progress.messages.is_empty() {
            return Err(anyhow!("progress messages must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<GateConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
