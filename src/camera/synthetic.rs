//! Synthetic camera (`stub://`) for tests and demos.
//!
//! URL options:
//! - `warmup_ms=N` the source reports `0x0` for the first N milliseconds
//! - `deny=true` every access request is refused
//! - `width=W&height=H` override the configured geometry

use anyhow::{anyhow, Result};
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use super::CameraSettings;
use crate::error::CameraAccessError;
use crate::frame::{FrameSource, LiveFrame, VideoDevice};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub warmup: Duration,
    pub deny: bool,
}

/// Shared counters for observing a synthetic device from tests.
#[derive(Clone, Debug, Default)]
pub struct SyntheticMonitor {
    inner: Arc<MonitorState>,
}

#[derive(Debug, Default)]
struct MonitorState {
    opens: AtomicUsize,
    live_tracks: AtomicUsize,
    frames: AtomicU64,
}

impl SyntheticMonitor {
    /// Successful access grants so far.
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Tracks currently live across every source this device handed out.
    pub fn live_tracks(&self) -> usize {
        self.inner.live_tracks.load(Ordering::SeqCst)
    }

    pub fn frames_grabbed(&self) -> u64 {
        self.inner.frames.load(Ordering::SeqCst)
    }
}

pub struct SyntheticDevice {
    config: SyntheticConfig,
    monitor: SyntheticMonitor,
}

impl SyntheticDevice {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            monitor: SyntheticMonitor::default(),
        }
    }

    pub fn from_settings(settings: &CameraSettings) -> Result<Self, CameraAccessError> {
        let config = parse_stub_url(settings).map_err(|err| CameraAccessError::Unavailable {
            device: settings.url.clone(),
            reason: err.to_string(),
        })?;
        Ok(Self::new(config))
    }

    pub fn monitor(&self) -> SyntheticMonitor {
        self.monitor.clone()
    }
}

impl VideoDevice for SyntheticDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn open(&mut self) -> Result<Box<dyn FrameSource>, CameraAccessError> {
        if self.config.deny {
            return Err(CameraAccessError::PermissionDenied {
                device: self.config.name.clone(),
            });
        }
        self.monitor.inner.opens.fetch_add(1, Ordering::SeqCst);
        self.monitor.inner.live_tracks.fetch_add(1, Ordering::SeqCst);
        log::info!("SyntheticDevice: {} opened", self.config.name);
        Ok(Box::new(SyntheticSource {
            config: self.config.clone(),
            monitor: self.monitor.clone(),
            opened_at: Instant::now(),
            live: true,
            frame_count: 0,
        }))
    }
}

struct SyntheticSource {
    config: SyntheticConfig,
    monitor: SyntheticMonitor,
    opened_at: Instant,
    live: bool,
    frame_count: u64,
}

impl SyntheticSource {
    fn warmed_up(&self) -> bool {
        self.opened_at.elapsed() >= self.config.warmup
    }

    /// Diagonal gradient with a little sensor noise.
    fn generate_pixels(&self) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let width = self.config.width as usize;
        let mut pixels = vec![0u8; LiveFrame::expected_len(self.config.width, self.config.height)];
        for (i, pixel) in pixels.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % width, i / width);
            let base = ((x + y) as u64 + self.frame_count) % 256;
            let noise: u8 = rng.gen_range(0..4);
            pixel[0] = (base as u8).wrapping_add(noise);
            pixel[1] = ((base * 2) % 256) as u8;
            pixel[2] = 255 - base as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn dimensions(&self) -> (u32, u32) {
        if !self.live || !self.warmed_up() {
            return (0, 0);
        }
        (self.config.width, self.config.height)
    }

    fn grab(&mut self) -> Result<LiveFrame> {
        if !self.live {
            return Err(anyhow!("synthetic source {} is stopped", self.config.name));
        }
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic source {} still warming up", self.config.name));
        }
        self.frame_count += 1;
        self.monitor.inner.frames.fetch_add(1, Ordering::SeqCst);
        Ok(LiveFrame::new(self.generate_pixels(), width, height))
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.live)
    }

    fn stop_tracks(&mut self) -> usize {
        if !self.live {
            return 0;
        }
        self.live = false;
        self.monitor.inner.live_tracks.fetch_sub(1, Ordering::SeqCst);
        1
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

fn parse_stub_url(settings: &CameraSettings) -> Result<SyntheticConfig> {
    let url = Url::parse(&settings.url)?;
    if url.scheme() != "stub" {
        return Err(anyhow!("expected stub:// url, got {}", url.scheme()));
    }
    let mut config = SyntheticConfig {
        name: settings.url.clone(),
        width: settings.width,
        height: settings.height,
        warmup: Duration::ZERO,
        deny: false,
    };
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "warmup_ms" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| anyhow!("warmup_ms must be an integer"))?;
                config.warmup = Duration::from_millis(ms);
            }
            "deny" => config.deny = matches!(value.as_ref(), "1" | "true" | "yes"),
            "width" => {
                config.width = value.parse().map_err(|_| anyhow!("width must be an integer"))?
            }
            "height" => {
                config.height = value
                    .parse()
                    .map_err(|_| anyhow!("height must be an integer"))?
            }
            other => log::warn!("SyntheticDevice: ignoring unknown option '{}'", other),
        }
    }
    Ok(config)
}
