//! Error taxonomy for the consent → capture → submission flow.
//!
//! Every variant here is converted into a user-facing string at the
//! pipeline or controller boundary. Nothing in this crate lets one of these
//! escape to a process-level handler.

use thiserror::Error;

use crate::flow::FlowState;

/// Camera permission was refused or no usable device exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraAccessError {
    #[error("camera permission denied for {device}")]
    PermissionDenied { device: String },
    #[error("camera {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },
}

/// Freezing a frame into a snapshot failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The frame source has not produced a sized frame yet. The session stays
    /// active so the user can try again.
    #[error("camera not ready: frame source reports {width}x{height}")]
    NotReady { width: u32, height: u32 },
    #[error("no active camera session")]
    Inactive,
    #[error("frame read failed: {0}")]
    Device(String),
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("no snapshot captured")]
    MissingSnapshot,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote returned status {code}")]
    Status { code: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a submission is already in flight")]
    InFlight,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("registration failed: {0}")]
    Registration(RemoteError),
    /// Registration succeeded, only the code request failed.
    #[error("code generation failed: {0}")]
    CodeGeneration(RemoteError),
}

impl SubmitError {
    pub fn is_partial_success(&self) -> bool {
        matches!(self, SubmitError::CodeGeneration(_))
    }
}

/// Umbrella error returned by `FlowController` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error(transparent)]
    CameraAccess(#[from] CameraAccessError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: FlowState,
        action: &'static str,
    },
}
