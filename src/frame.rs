//! Live frame isolation layer.
//!
//! - `LiveFrame`: opaque RGB8 pixel container. Bytes are private to the crate.
//! - `FrameSource`: a live, device-backed stream of frames with stoppable tracks.
//! - `VideoDevice`: the platform capability that grants (or refuses) a
//!   video-only frame source.
//!
//! The ONLY path from pixels to something that leaves the process is
//! `SnapshotCapture::capture`, which encodes a single frame and tears down
//! the session that produced it.

use anyhow::Result;
use zeroize::Zeroize;

use crate::error::CameraAccessError;

// ----------------------------------------------------------------------------
// LiveFrame: opaque pixel container
// ----------------------------------------------------------------------------

/// One RGB8 frame read from a live source.
///
/// There is no `Clone`, no `AsRef<[u8]>` and no `Debug` that prints pixels.
/// Pixel data is zeroized on drop.
pub struct LiveFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl LiveFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Expected byte length for an RGB8 frame of these dimensions.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == Self::expected_len(self.width, self.height)
    }

    pub(crate) fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for LiveFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Drop for LiveFrame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// Device boundary
// ----------------------------------------------------------------------------

/// A live frame source handed out by a `VideoDevice`.
///
/// Implementations hold the underlying hardware for as long as any track is
/// live. `stop_tracks` must release it and be safe to call repeatedly.
pub trait FrameSource: Send {
    /// Current native frame dimensions. `(0, 0)` until the device warms up.
    fn dimensions(&self) -> (u32, u32);

    /// Read the current frame at native resolution.
    fn grab(&mut self) -> Result<LiveFrame>;

    /// Number of device tracks that are still live.
    fn live_tracks(&self) -> usize;

    /// Stop every live track. Returns how many were stopped by this call.
    fn stop_tracks(&mut self) -> usize;
}

/// Capability to request video-only access to the default capture device.
pub trait VideoDevice: Send {
    /// Device identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Request access. Blocks while the platform asks for permission or the
    /// hardware comes up.
    fn open(&mut self) -> Result<Box<dyn FrameSource>, CameraAccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_shape_checks() {
        let frame = LiveFrame::new(vec![0u8; 2 * 2 * 3], 2, 2);
        assert!(frame.is_well_formed());

        let short = LiveFrame::new(vec![0u8; 5], 2, 2);
        assert!(!short.is_well_formed());

        let empty = LiveFrame::new(Vec::new(), 0, 0);
        assert!(!empty.is_well_formed());
    }

    #[test]
    fn debug_does_not_print_pixels() {
        let frame = LiveFrame::new(vec![0xAB; 3], 1, 1);
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("width: 1"));
        assert!(!rendered.contains("171"));
    }
}
