//! Camera acquisition.
//!
//! Devices are selected by URL, the same way for every front end:
//! - `stub://name?warmup_ms=N&deny=true` synthetic device (tests, demos)
//! - `http(s)://host/capture` JPEG snapshot endpoint (IP cameras, ESP32 boards)
//! - `/dev/videoN` local V4L2 device (feature: camera-v4l2)
//!
//! A `CameraSession` exclusively owns the frame source it was granted. The
//! device is released on `stop()`, and `Drop` calls `stop()`, so no exit path
//! can leak a live handle.

pub mod http;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

pub use http::HttpSnapshotDevice;
pub use synthetic::{SyntheticDevice, SyntheticMonitor};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Device;

use crate::error::CameraAccessError;
use crate::frame::{FrameSource, VideoDevice};

/// Camera selection and preferred geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: "stub://front_camera".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Build the device named by `settings.url`.
pub fn open_device(settings: &CameraSettings) -> Result<Box<dyn VideoDevice>, CameraAccessError> {
    let url = settings.url.as_str();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticDevice::from_settings(settings)?));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Box::new(HttpSnapshotDevice::new(url)?));
    }
    if url.starts_with("/dev/video") {
        #[cfg(feature = "camera-v4l2")]
        {
            return Ok(Box::new(V4l2Device::new(settings.clone())));
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            return Err(CameraAccessError::Unavailable {
                device: url.to_string(),
                reason: "v4l2 capture requires the camera-v4l2 feature".to_string(),
            });
        }
    }
    Err(CameraAccessError::Unavailable {
        device: url.to_string(),
        reason: "unsupported camera url; expected stub://, http(s):// or /dev/videoN"
            .to_string(),
    })
}

/// An active binding to a live video device.
pub struct CameraSession {
    device: String,
    source: Option<Box<dyn FrameSource>>,
}

impl CameraSession {
    /// Request access to `device` and take exclusive ownership of its stream.
    pub fn start(device: &mut dyn VideoDevice) -> Result<Self, CameraAccessError> {
        let name = device.name().to_string();
        match device.open() {
            Ok(source) => {
                let (width, height) = source.dimensions();
                log::info!(
                    "camera session started on {} ({}x{}, {} track(s))",
                    name,
                    width,
                    height,
                    source.live_tracks()
                );
                Ok(Self {
                    device: name,
                    source: Some(source),
                })
            }
            Err(err) => {
                log::warn!("camera access failed: {}", err);
                Err(err)
            }
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Dimensions of the live source, `None` once stopped.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|source| source.dimensions())
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut (dyn FrameSource + 'static)> {
        self.source.as_deref_mut()
    }

    /// Halt every track and release the device. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        let stopped = source.stop_tracks();
        log::info!(
            "camera session on {} stopped ({} track(s) released)",
            self.device,
            stopped
        );
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("device", &self.device)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(url: &str) -> CameraSettings {
        CameraSettings {
            url: url.to_string(),
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn stop_is_idempotent_and_releases_tracks() -> anyhow::Result<()> {
        let mut device = SyntheticDevice::from_settings(&stub("stub://idempotent"))?;
        let monitor = device.monitor();
        let mut session = CameraSession::start(&mut device)?;
        assert!(session.is_active());
        assert_eq!(monitor.live_tracks(), 1);

        session.stop();
        session.stop();
        assert!(!session.is_active());
        assert_eq!(session.dimensions(), None);
        assert_eq!(monitor.live_tracks(), 0);
        Ok(())
    }

    #[test]
    fn dropping_a_session_releases_the_device() -> anyhow::Result<()> {
        let mut device = SyntheticDevice::from_settings(&stub("stub://dropped"))?;
        let monitor = device.monitor();
        {
            let _session = CameraSession::start(&mut device)?;
            assert_eq!(monitor.live_tracks(), 1);
        }
        assert_eq!(monitor.live_tracks(), 0);
        Ok(())
    }

    #[test]
    fn denied_device_reports_access_error() -> anyhow::Result<()> {
        let mut device = SyntheticDevice::from_settings(&stub("stub://locked?deny=true"))?;
        let monitor = device.monitor();
        let err = CameraSession::start(&mut device).unwrap_err();
        assert!(matches!(err, CameraAccessError::PermissionDenied { .. }));
        assert_eq!(monitor.live_tracks(), 0);
        Ok(())
    }

    #[test]
    fn unknown_scheme_is_unavailable() {
        let err = open_device(&stub("rtsp://camera-1")).err();
        assert!(matches!(
            err,
            Some(CameraAccessError::Unavailable { .. })
        ));
    }

    #[cfg(not(feature = "camera-v4l2"))]
    #[test]
    fn v4l2_paths_need_the_feature() {
        let err = open_device(&stub("/dev/video0")).err();
        assert!(matches!(
            err,
            Some(CameraAccessError::Unavailable { .. })
        ));
    }
}
