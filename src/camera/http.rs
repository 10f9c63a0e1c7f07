//! HTTP JPEG snapshot camera.
//!
//! Fetches one JPEG per frame from a snapshot endpoint (IP cameras, ESP32-CAM
//! `/capture` handlers) and decodes it in-memory. Decoded frames are never
//! written to disk.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::io::Read;
use std::time::Duration;

use crate::error::CameraAccessError;
use crate::frame::{FrameSource, LiveFrame, VideoDevice};

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSnapshotDevice {
    url: String,
    agent: ureq::Agent,
}

impl HttpSnapshotDevice {
    pub fn new(url: &str) -> Result<Self, CameraAccessError> {
        url::Url::parse(url).map_err(|err| CameraAccessError::Unavailable {
            device: url.to_string(),
            reason: format!("invalid url: {}", err),
        })?;
        Ok(Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(FETCH_TIMEOUT).build(),
        })
    }
}

impl VideoDevice for HttpSnapshotDevice {
    fn name(&self) -> &str {
        &self.url
    }

    /// Opening fetches one frame, so the source knows its native size.
    fn open(&mut self) -> Result<Box<dyn FrameSource>, CameraAccessError> {
        let frame = fetch_frame(&self.agent, &self.url).map_err(|err| match err {
            FetchError::Denied(code) => {
                log::warn!("HttpSnapshotDevice: {} refused access ({})", self.url, code);
                CameraAccessError::PermissionDenied {
                    device: self.url.clone(),
                }
            }
            FetchError::Other(err) => CameraAccessError::Unavailable {
                device: self.url.clone(),
                reason: format!("{:#}", err),
            },
        })?;
        log::info!(
            "HttpSnapshotDevice: connected to {} ({}x{})",
            self.url,
            frame.width,
            frame.height
        );
        Ok(Box::new(HttpSnapshotSource {
            url: self.url.clone(),
            agent: self.agent.clone(),
            width: frame.width,
            height: frame.height,
            live: true,
        }))
    }
}

struct HttpSnapshotSource {
    url: String,
    agent: ureq::Agent,
    width: u32,
    height: u32,
    live: bool,
}

impl FrameSource for HttpSnapshotSource {
    fn dimensions(&self) -> (u32, u32) {
        if self.live {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn grab(&mut self) -> Result<LiveFrame> {
        if !self.live {
            return Err(anyhow!("http snapshot source {} is stopped", self.url));
        }
        let frame = fetch_frame(&self.agent, &self.url).map_err(|err| match err {
            FetchError::Denied(code) => anyhow!("camera refused frame request ({})", code),
            FetchError::Other(err) => err,
        })?;
        self.width = frame.width;
        self.height = frame.height;
        Ok(frame)
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.live)
    }

    fn stop_tracks(&mut self) -> usize {
        let was_live = self.live;
        self.live = false;
        usize::from(was_live)
    }
}

enum FetchError {
    Denied(u16),
    Other(anyhow::Error),
}

fn fetch_frame(agent: &ureq::Agent, url: &str) -> Result<LiveFrame, FetchError> {
    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code @ (401 | 403), _)) => return Err(FetchError::Denied(code)),
        Err(err) => {
            return Err(FetchError::Other(
                anyhow::Error::new(err).context(format!("fetch jpeg snapshot from {}", url)),
            ))
        }
    };
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")
        .map_err(FetchError::Other)?;
    if bytes.is_empty() {
        return Err(FetchError::Other(anyhow!("empty jpeg snapshot")));
    }
    decode_jpeg(&bytes).map_err(FetchError::Other)
}

fn decode_jpeg(bytes: &[u8]) -> Result<LiveFrame> {
    let image = image::load_from_memory(bytes).context("decode jpeg")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok(LiveFrame::new(rgb.into_raw(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_urls() {
        assert!(matches!(
            HttpSnapshotDevice::new("http://"),
            Err(CameraAccessError::Unavailable { .. })
        ));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_jpeg(&[0xFF, 0xD8, 0x00, 0x01]).is_err());
    }

    #[test]
    fn unreachable_endpoint_is_unavailable() -> Result<()> {
        // Port 9 (discard) on loopback is closed on test hosts.
        let mut device = HttpSnapshotDevice::new("http://127.0.0.1:9/capture")
            .map_err(|err| anyhow!("{}", err))?;
        assert!(matches!(
            device.open().err(),
            Some(CameraAccessError::Unavailable { .. })
        ));
        Ok(())
    }
}
