//! Snapshot capture.
//!
//! `SnapshotCapture::capture` freezes one frame of an active `CameraSession`
//! into a self-contained data URL and then stops that session. From the
//! caller's point of view the two steps are atomic: a returned `Snapshot`
//! always means the device has already been released.

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use zeroize::Zeroize;

use crate::camera::CameraSession;
use crate::error::CaptureError;
use crate::frame::LiveFrame;

const JPEG_QUALITY: u8 = 90;

static SNAPSHOT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl SnapshotFormat {
    pub fn mime(self) -> &'static str {
        match self {
            SnapshotFormat::Png => "image/png",
            SnapshotFormat::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(SnapshotFormat::Png),
            "jpeg" | "jpg" => Ok(SnapshotFormat::Jpeg),
            other => Err(anyhow::anyhow!(
                "unsupported snapshot format '{}'; expected png or jpeg",
                other
            )),
        }
    }
}

/// A frozen, encoded still image.
///
/// Not `Clone`: there is exactly one copy per capture, and it is zeroized on
/// drop. A later capture replaces it (see `sequence`).
pub struct Snapshot {
    data_url: String,
    pub width: u32,
    pub height: u32,
    pub format: SnapshotFormat,
    /// Process-wide capture order. Higher is newer.
    pub sequence: u64,
    pub captured_at: SystemTime,
    fingerprint: String,
}

impl Snapshot {
    /// `data:<mime>;base64,<payload>`, ready for the registration request.
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Short SHA-256 prefix of the encoded image. Safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn encode(frame: &LiveFrame, format: SnapshotFormat) -> Result<Self, CaptureError> {
        if !frame.is_well_formed() {
            return Err(CaptureError::Encode(format!(
                "frame buffer does not match {}x{} rgb8",
                frame.width, frame.height
            )));
        }
        let mut encoded = Vec::new();
        let result = match format {
            SnapshotFormat::Png => PngEncoder::new(&mut encoded).write_image(
                frame.pixels(),
                frame.width,
                frame.height,
                ExtendedColorType::Rgb8,
            ),
            SnapshotFormat::Jpeg => JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
                .write_image(
                    frame.pixels(),
                    frame.width,
                    frame.height,
                    ExtendedColorType::Rgb8,
                ),
        };
        result.map_err(|err| CaptureError::Encode(err.to_string()))?;

        let digest = Sha256::digest(&encoded);
        let fingerprint = hex::encode(&digest[..6]);
        let data_url = format!(
            "data:{};base64,{}",
            format.mime(),
            general_purpose::STANDARD.encode(&encoded)
        );
        encoded.zeroize();

        Ok(Self {
            data_url,
            width: frame.width,
            height: frame.height,
            format,
            sequence: SNAPSHOT_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1,
            captured_at: SystemTime::now(),
            fingerprint,
        })
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.data_url.zeroize();
    }
}

/// Freezes frames from a camera session.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotCapture {
    format: SnapshotFormat,
}

impl SnapshotCapture {
    pub fn new(format: SnapshotFormat) -> Self {
        Self { format }
    }

    /// Read the current frame, encode it, then stop `session`.
    ///
    /// A zero-sized source fails with `CaptureError::NotReady` and leaves the
    /// session running so the caller can try again. Read and encode failures
    /// also leave it running.
    pub fn capture(&self, session: &mut CameraSession) -> Result<Snapshot, CaptureError> {
        let source = session.source_mut().ok_or(CaptureError::Inactive)?;
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            log::debug!("capture refused: source reports {}x{}", width, height);
            return Err(CaptureError::NotReady { width, height });
        }
        let frame = source
            .grab()
            .map_err(|err| CaptureError::Device(format!("{:#}", err)))?;
        let snapshot = Snapshot::encode(&frame, self.format)?;
        drop(frame);
        session.stop();

        log::info!(
            "snapshot #{} captured ({}x{} {}, fingerprint {})",
            snapshot.sequence,
            snapshot.width,
            snapshot.height,
            snapshot.format.mime(),
            snapshot.fingerprint
        );
        Ok(snapshot)
    }
}
