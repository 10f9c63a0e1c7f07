//! V4L2 camera device (feature: camera-v4l2).
//!
//! Opens a local device node (e.g. /dev/video0) as RGB3 and streams through
//! memory-mapped buffers. Stopping the source drops the stream and the device
//! handle, which hands the camera back to the kernel.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::CameraSettings;
use crate::error::CameraAccessError;
use crate::frame::{FrameSource, LiveFrame, VideoDevice};

const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Device {
    settings: CameraSettings,
}

impl V4l2Device {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }
}

impl VideoDevice for V4l2Device {
    fn name(&self) -> &str {
        &self.settings.url
    }

    fn open(&mut self) -> Result<Box<dyn FrameSource>, CameraAccessError> {
        let device = self.settings.url.clone();
        let source = V4l2Source::connect(&self.settings).map_err(|err| {
            let permission = err.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .map(|io| io.kind() == std::io::ErrorKind::PermissionDenied)
                    .unwrap_or(false)
            });
            if permission {
                CameraAccessError::PermissionDenied { device }
            } else {
                CameraAccessError::Unavailable {
                    device,
                    reason: format!("{:#}", err),
                }
            }
        })?;
        Ok(Box::new(source))
    }
}

#[self_referencing]
struct V4l2Stream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct V4l2Source {
    path: String,
    state: Option<V4l2Stream>,
    width: u32,
    height: u32,
}

impl V4l2Source {
    fn connect(settings: &CameraSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&settings.url)
            .with_context(|| format!("open v4l2 device {}", settings.url))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Device: failed to set format on {}: {}",
                    settings.url,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "v4l2 device {} does not deliver RGB3 frames",
                settings.url
            ));
        }

        let state = V4l2StreamTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Device: connected to {} ({}x{})",
            settings.url,
            format.width,
            format.height
        );
        Ok(Self {
            path: settings.url.clone(),
            state: Some(state),
            width: format.width,
            height: format.height,
        })
    }
}

impl FrameSource for V4l2Source {
    fn dimensions(&self) -> (u32, u32) {
        if self.state.is_some() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn grab(&mut self) -> Result<LiveFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;
        let expected = LiveFrame::expected_len(self.width, self.height);
        if buf.len() < expected {
            return Err(anyhow!(
                "short v4l2 frame: {} bytes, expected {}",
                buf.len(),
                expected
            ));
        }
        Ok(LiveFrame::new(
            buf[..expected].to_vec(),
            self.width,
            self.height,
        ))
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.state.is_some())
    }

    fn stop_tracks(&mut self) -> usize {
        match self.state.take() {
            Some(state) => {
                drop(state);
                log::debug!("V4l2Device: released {}", self.path);
                1
            }
            None => 0,
        }
    }
}
