//! Flow controller.
//!
//! Owns every user-visible transition of the single-screen flow:
//!
//! ```text
//! Consenting → CameraActive → SnapshotHeld → Submitting → Resolved
//! ```
//!
//! Views subscribe to `FlowEvent`s instead of polling. The controller is the
//! only owner of the camera session, so at most one device handle is live at
//! any time, and every path that leaves `CameraActive` (capture, reset, drop)
//! stops it.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::announcer::StatusSink;
use crate::camera::CameraSession;
use crate::consent::{ConsentGate, ConsentItem};
use crate::email::EmailInput;
use crate::error::{CaptureError, FlowError, SubmitError, ValidationError};
use crate::frame::VideoDevice;
use crate::remote::RegistrationService;
use crate::snapshot::{Snapshot, SnapshotCapture};
use crate::submission::{failure_message, SubmissionPipeline, SubmissionState};

pub const MSG_CAMERA_DENIED: &str = "Unable to access the camera. Please grant permissions.";
pub const MSG_CAMERA_NOT_READY: &str = "The camera is still starting. Please try again.";
pub const MSG_CAPTURE_FAILED: &str = "Could not take the selfie. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowState {
    Consenting,
    CameraActive,
    SnapshotHeld,
    Submitting,
    Resolved,
}

/// The four steps shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlowStep {
    Consent,
    Selfie,
    Email,
    Code,
}

impl FlowStep {
    pub const ALL: [FlowStep; 4] = [
        FlowStep::Consent,
        FlowStep::Selfie,
        FlowStep::Email,
        FlowStep::Code,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FlowStep::Consent => "Consent",
            FlowStep::Selfie => "Selfie",
            FlowStep::Email => "Email",
            FlowStep::Code => "Code",
        }
    }

    /// 1-based position.
    pub fn number(self) -> usize {
        self as usize + 1
    }
}

impl FlowState {
    pub fn step(self) -> FlowStep {
        match self {
            FlowState::Consenting => FlowStep::Consent,
            FlowState::CameraActive => FlowStep::Selfie,
            FlowState::SnapshotHeld | FlowState::Submitting => FlowStep::Email,
            FlowState::Resolved => FlowStep::Code,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    StateChanged(FlowState),
    /// Cosmetic progress text while a submission is in flight.
    Status(String),
    /// Inline, non-fatal message (camera refused, bad email, ...).
    Notice(String),
    Resolved(SubmissionState),
}

/// Fan-out of flow events to any number of subscribers.
#[derive(Clone, Default)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Vec<Sender<FlowEvent>>>>,
}

impl Broadcaster {
    pub fn subscribe(&self) -> Receiver<FlowEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber; hung-up receivers are dropped.
    pub fn publish(&self, event: FlowEvent) {
        self.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<FlowEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct FlowController<S> {
    state: FlowState,
    consent: ConsentGate,
    device: Box<dyn VideoDevice>,
    session: Option<CameraSession>,
    capture: SnapshotCapture,
    snapshot: Option<Snapshot>,
    email: EmailInput,
    pipeline: SubmissionPipeline<S>,
    submission: SubmissionState,
    status: Arc<Mutex<Option<String>>>,
    notice: Option<String>,
    events: Broadcaster,
}

impl<S: RegistrationService> FlowController<S> {
    pub fn new(
        device: Box<dyn VideoDevice>,
        capture: SnapshotCapture,
        pipeline: SubmissionPipeline<S>,
    ) -> Self {
        Self {
            state: FlowState::Consenting,
            consent: ConsentGate::new(),
            device,
            session: None,
            capture,
            snapshot: None,
            email: EmailInput::new(),
            pipeline,
            submission: SubmissionState::Idle,
            status: Arc::new(Mutex::new(None)),
            notice: None,
            events: Broadcaster::default(),
        }
    }

    pub fn subscribe(&self) -> Receiver<FlowEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn consent(&self) -> &ConsentGate {
        &self.consent
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn email(&self) -> &EmailInput {
        &self.email
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn camera_active(&self) -> bool {
        self.session
            .as_ref()
            .map(CameraSession::is_active)
            .unwrap_or(false)
    }

    pub fn pipeline(&self) -> &SubmissionPipeline<S> {
        &self.pipeline
    }

    /// Current submission state, with the latest status text while in flight.
    pub fn submission(&self) -> SubmissionState {
        match &self.submission {
            SubmissionState::Submitting { .. } => SubmissionState::Submitting {
                status: self
                    .status
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone(),
            },
            other => other.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Consent
    // ------------------------------------------------------------------

    pub fn toggle_consent(&mut self, item: ConsentItem) -> Result<(), FlowError> {
        self.require_open_consent()?;
        self.consent.toggle(item);
        Ok(())
    }

    pub fn set_consent(&mut self, item: ConsentItem, accepted: bool) -> Result<(), FlowError> {
        self.require_open_consent()?;
        self.consent.set(item, accepted);
        Ok(())
    }

    /// Consent is editable only before it is granted, including after a
    /// camera refusal leaves the flow in `Consenting`.
    fn require_open_consent(&self) -> Result<(), FlowError> {
        self.require(&[FlowState::Consenting], "change consent")?;
        if self.consent.is_granted() {
            return Err(FlowError::InvalidTransition {
                state: self.state,
                action: "change consent after it was granted",
            });
        }
        Ok(())
    }

    /// Grant consent and start the camera. A no-op while any item is unchecked.
    pub fn accept(&mut self) -> Result<FlowState, FlowError> {
        self.require(&[FlowState::Consenting], "accept consent")?;
        if !self.consent.accept() {
            log::debug!("accept ignored: consent incomplete");
            return Ok(self.state);
        }
        self.start_camera()?;
        Ok(self.state)
    }

    /// Manual retry after a camera access failure.
    pub fn retry_camera(&mut self) -> Result<FlowState, FlowError> {
        self.require(&[FlowState::Consenting], "retry the camera")?;
        if !self.consent.is_granted() {
            return Err(FlowError::InvalidTransition {
                state: self.state,
                action: "start the camera before consent",
            });
        }
        self.start_camera()?;
        Ok(self.state)
    }

    // ------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------

    fn start_camera(&mut self) -> Result<(), FlowError> {
        self.release_camera();
        match CameraSession::start(self.device.as_mut()) {
            Ok(session) => {
                self.session = Some(session);
                self.clear_notice();
                self.transition(FlowState::CameraActive);
                Ok(())
            }
            Err(err) => {
                self.set_notice(MSG_CAMERA_DENIED);
                Err(err.into())
            }
        }
    }

    fn release_camera(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    pub fn capture(&mut self) -> Result<&Snapshot, FlowError> {
        self.require(&[FlowState::CameraActive], "capture")?;
        let session = self.session.as_mut().ok_or(CaptureError::Inactive)?;
        match self.capture.capture(session) {
            Ok(snapshot) => {
                self.session = None;
                self.clear_notice();
                self.submission = SubmissionState::Idle;
                self.transition(FlowState::SnapshotHeld);
                Ok(&*self.snapshot.insert(snapshot))
            }
            Err(err) => {
                let notice = match err {
                    CaptureError::NotReady { .. } => MSG_CAMERA_NOT_READY,
                    _ => MSG_CAPTURE_FAILED,
                };
                log::warn!("capture failed: {}", err);
                self.set_notice(notice);
                Err(err.into())
            }
        }
    }

    /// Discard the held snapshot and go back to the live camera.
    pub fn retake(&mut self) -> Result<FlowState, FlowError> {
        self.require(&[FlowState::SnapshotHeld, FlowState::Resolved], "retake")?;
        self.snapshot = None;
        self.submission = SubmissionState::Idle;
        self.start_camera()?;
        Ok(self.state)
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    pub fn set_email(&mut self, value: impl Into<String>) {
        self.email.set(value);
    }

    /// Submit the held snapshot with the current email.
    ///
    /// Every pipeline outcome (success, partial success, registration or
    /// validation failure) resolves the attempt and is returned as `Ok`.
    /// `Err` means the attempt never started.
    pub fn submit(&mut self) -> Result<SubmissionState, FlowError> {
        if self.state == FlowState::Submitting {
            return Err(SubmitError::InFlight.into());
        }
        self.require(&[FlowState::SnapshotHeld, FlowState::Resolved], "submit")?;
        if self.snapshot.is_none() {
            self.set_notice(failure_message(&SubmitError::Validation(
                ValidationError::MissingSnapshot,
            )));
            return Err(ValidationError::MissingSnapshot.into());
        }
        if self.email.is_empty() {
            self.set_notice(failure_message(&SubmitError::Validation(
                ValidationError::InvalidEmail,
            )));
            return Err(ValidationError::InvalidEmail.into());
        }

        self.clear_notice();
        self.email.validate();
        *self.lock_status() = None;
        self.submission = SubmissionState::Submitting { status: None };
        self.transition(FlowState::Submitting);

        let sink = self.status_sink();
        let result = {
            let mut attempt = SubmitAttempt {
                state: &mut self.state,
                submission: &mut self.submission,
                finished: false,
            };
            let result = self
                .pipeline
                .submit(self.email.value(), self.snapshot.as_ref(), sink);
            attempt.finished = true;
            result
        };
        *self.lock_status() = None;

        if let Err(err @ SubmitError::Validation(_)) = &result {
            self.set_notice(failure_message(err));
        }
        self.submission = SubmissionState::from_result(&result);
        if let Some(message) = self.submission.message() {
            log::info!("submission resolved: {}", message);
        }
        self.transition(FlowState::Resolved);
        self.events
            .publish(FlowEvent::Resolved(self.submission.clone()));
        Ok(self.submission.clone())
    }

    fn status_sink(&self) -> StatusSink {
        let status = self.status.clone();
        let events = self.events.clone();
        Arc::new(move |message: &str| {
            *status
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message.to_string());
            events.publish(FlowEvent::Status(message.to_string()));
        })
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start over: consent cleared, camera released, snapshot dropped.
    pub fn reset(&mut self) -> Result<(), FlowError> {
        if self.state == FlowState::Submitting {
            return Err(SubmitError::InFlight.into());
        }
        self.release_camera();
        self.consent = ConsentGate::new();
        self.snapshot = None;
        self.email = EmailInput::new();
        self.submission = SubmissionState::Idle;
        self.clear_notice();
        self.transition(FlowState::Consenting);
        Ok(())
    }

    /// Tear the flow down. Releases the camera if it is still held.
    pub fn close(&mut self) {
        self.release_camera();
    }

    fn require(&self, allowed: &[FlowState], action: &'static str) -> Result<(), FlowError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }

    fn transition(&mut self, next: FlowState) {
        if self.state != next {
            log::info!("flow: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.events.publish(FlowEvent::StateChanged(next));
    }

    fn set_notice(&mut self, message: &str) {
        self.notice = Some(message.to_string());
        self.events.publish(FlowEvent::Notice(message.to_string()));
    }

    fn clear_notice(&mut self) {
        self.notice = None;
    }
}

/// Rolls the controller back to `SnapshotHeld` if the pipeline unwinds.
struct SubmitAttempt<'a> {
    state: &'a mut FlowState,
    submission: &'a mut SubmissionState,
    finished: bool,
}

impl Drop for SubmitAttempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("submission abandoned mid-flight; snapshot kept for another attempt");
            *self.state = FlowState::SnapshotHeld;
            *self.submission = SubmissionState::Idle;
        }
    }
}

impl<S> Drop for FlowController<S> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }
}
