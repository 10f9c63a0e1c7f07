//! Selfie Gate
//!
//! Client-side flow that gates a camera snapshot behind consent, then trades
//! the snapshot and an email address for a one-time code.
//!
//! # Flow
//!
//! ```text
//! Consenting → CameraActive → SnapshotHeld → Submitting → Resolved
//! ```
//!
//! 1. **Consent**: every consent item must be accepted before the camera starts.
//! 2. **Camera**: exactly one device session is live at a time, and every exit
//!    path stops it.
//! 3. **Capture**: one frame is frozen into a data URL and the session is
//!    stopped in the same step.
//! 4. **Submission**: register, then request a code. A failed code request
//!    after a successful registration is a partial success, not a failure.
//!
//! # Module Structure
//!
//! - `consent`: ConsentGate and the fixed consent items
//! - `frame`, `camera`: device boundary, sessions, backends
//! - `snapshot`: capture and encoding
//! - `ticker`, `announcer`: cosmetic progress messages
//! - `email`, `remote`, `submission`: validation and the two remote calls
//! - `flow`: the state machine and its event stream

use anyhow::Result;

pub mod announcer;
pub mod camera;
pub mod config;
pub mod consent;
pub mod email;
pub mod error;
pub mod flow;
pub mod frame;
pub mod remote;
pub mod snapshot;
pub mod submission;
pub mod ticker;
pub mod ui;

pub use announcer::{Announcement, AnnouncerStats, ProgressAnnouncer, StatusSink};
pub use camera::{open_device, CameraSession, CameraSettings, SyntheticDevice, SyntheticMonitor};
pub use config::GateConfig;
pub use consent::{ConsentGate, ConsentItem, ConsentSet};
pub use email::{validate_email, EmailInput};
pub use error::{
    CameraAccessError, CaptureError, FlowError, RemoteError, SubmitError, ValidationError,
};
pub use flow::{Broadcaster, FlowController, FlowEvent, FlowState, FlowStep};
pub use frame::{FrameSource, LiveFrame, VideoDevice};
pub use remote::{GenerateCodeResponse, HttpRegistrationService, RegistrationService};
pub use snapshot::{Snapshot, SnapshotCapture, SnapshotFormat};
pub use submission::{SubmissionPipeline, SubmissionState, CODE_PLACEHOLDER};

/// Wire a controller from configuration: configured camera, HTTP backend,
/// configured progress messages and snapshot format.
pub fn build_flow(cfg: &GateConfig) -> Result<FlowController<HttpRegistrationService>> {
    let device = open_device(&cfg.camera)?;
    let service = HttpRegistrationService::new(&cfg.backend.base_url, cfg.backend.timeout)?;
    let announcer =
        ProgressAnnouncer::new(cfg.progress.messages.clone(), cfg.progress.interval)?;
    let pipeline = SubmissionPipeline::new(service, announcer);
    log::info!(
        "flow ready: camera={} backend={}",
        cfg.camera.url,
        cfg.backend.base_url
    );
    Ok(FlowController::new(
        device,
        SnapshotCapture::new(cfg.snapshot_format),
        pipeline,
    ))
}
