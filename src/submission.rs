//! Submission pipeline: validate → register → generate code.
//!
//! The two remote calls are strictly sequential. Code generation is only
//! attempted after registration returned 2xx, and its failure is reported as
//! a partial success (data stored, no code) rather than a plain failure.
//! The progress announcer brackets both calls and is ended exactly once on
//! every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::announcer::{ProgressAnnouncer, StatusSink};
use crate::email::{mask_email, validate_email};
use crate::error::{SubmitError, ValidationError};
use crate::remote::{RegisterRequest, RegistrationService};
use crate::snapshot::Snapshot;

/// Shown when the backend accepts but returns no `code` field.
pub const CODE_PLACEHOLDER: &str = "----";

pub const MSG_INVALID_EMAIL: &str = "Please enter a valid email address.";
pub const MSG_MISSING_SNAPSHOT: &str = "Please capture a selfie first.";
pub const MSG_REGISTRATION_FAILED: &str =
    "❌ We could not store your data right now. Please try again.";
pub const MSG_CODE_UNAVAILABLE: &str =
    "⚠️ We stored your data, but could not generate a code right now. Please contact support.";
pub const MSG_IN_FLIGHT: &str = "A submission is already in progress.";

pub fn success_message(code: &str) -> String {
    format!("✅ Your data has been stored. Here is the code: {}", code)
}

/// User-facing text for a failed attempt.
pub fn failure_message(err: &SubmitError) -> &'static str {
    match err {
        SubmitError::InFlight => MSG_IN_FLIGHT,
        SubmitError::Validation(ValidationError::InvalidEmail) => MSG_INVALID_EMAIL,
        SubmitError::Validation(ValidationError::MissingSnapshot) => MSG_MISSING_SNAPSHOT,
        SubmitError::Registration(_) => MSG_REGISTRATION_FAILED,
        SubmitError::CodeGeneration(_) => MSG_CODE_UNAVAILABLE,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    Submitting {
        status: Option<String>,
    },
    Succeeded {
        code: String,
        message: String,
    },
    Failed {
        error: SubmitError,
        message: String,
    },
}

impl SubmissionState {
    pub fn from_result(result: &Result<String, SubmitError>) -> Self {
        match result {
            Ok(code) => SubmissionState::Succeeded {
                code: code.clone(),
                message: success_message(code),
            },
            Err(error) => SubmissionState::Failed {
                error: error.clone(),
                message: failure_message(error).to_string(),
            },
        }
    }

    /// Final outcome text, or the current status while in flight.
    pub fn message(&self) -> Option<&str> {
        match self {
            SubmissionState::Idle | SubmissionState::Validating => None,
            SubmissionState::Submitting { status } => status.as_deref(),
            SubmissionState::Succeeded { message, .. } | SubmissionState::Failed { message, .. } => {
                Some(message)
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Succeeded { .. } | SubmissionState::Failed { .. }
        )
    }

    pub fn is_partial_success(&self) -> bool {
        matches!(self, SubmissionState::Failed { error, .. } if error.is_partial_success())
    }
}

pub struct SubmissionPipeline<S> {
    service: S,
    announcer: ProgressAnnouncer,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: RegistrationService> SubmissionPipeline<S> {
    pub fn new(service: S, announcer: ProgressAnnouncer) -> Self {
        Self {
            service,
            announcer,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn announcer(&self) -> &ProgressAnnouncer {
        &self.announcer
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn validate(email: &str, snapshot: Option<&Snapshot>) -> Result<(), ValidationError> {
        if !validate_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if snapshot.is_none() {
            return Err(ValidationError::MissingSnapshot);
        }
        Ok(())
    }

    /// Run one attempt. Returns the issued code (or the placeholder).
    ///
    /// A call made while another is in flight is rejected with
    /// `SubmitError::InFlight`; it is never queued.
    pub fn submit(
        &self,
        email: &str,
        snapshot: Option<&Snapshot>,
        status: StatusSink,
    ) -> Result<String, SubmitError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("duplicate submit ignored while a submission is in flight");
            return Err(SubmitError::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        Self::validate(email, snapshot)?;
        let Some(snapshot) = snapshot else {
            return Err(ValidationError::MissingSnapshot.into());
        };

        let announcement = self.announcer.begin(status);
        let result = self.exchange(email, snapshot);
        announcement.end();
        result
    }

    fn exchange(&self, email: &str, snapshot: &Snapshot) -> Result<String, SubmitError> {
        let masked = mask_email(email);
        log::info!(
            "registering {} with snapshot {}",
            masked,
            snapshot.fingerprint()
        );
        self.service
            .register(&RegisterRequest {
                email,
                selfie_data_url: snapshot.data_url(),
            })
            .map_err(|err| {
                log::warn!("registration failed for {}: {}", masked, err);
                SubmitError::Registration(err)
            })?;

        let response = self.service.generate_code().map_err(|err| {
            log::warn!("code generation failed after registering {}: {}", masked, err);
            SubmitError::CodeGeneration(err)
        })?;
        let code = response
            .code
            .filter(|code| !code.trim().is_empty())
            .unwrap_or_else(|| {
                log::warn!("backend returned no code; using placeholder");
                CODE_PLACEHOLDER.to_string()
            });
        log::info!("code issued for {}", masked);
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraSession, CameraSettings, SyntheticDevice};
    use crate::error::RemoteError;
    use crate::remote::GenerateCodeResponse;
    use crate::snapshot::SnapshotCapture;
    use anyhow::Result;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeService {
        register_result: Option<RemoteError>,
        code_result: Option<Result<GenerateCodeResponse, RemoteError>>,
        calls: Mutex<Vec<&'static str>>,
        delay: Duration,
    }

    impl FakeService {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RegistrationService for FakeService {
        fn register(&self, request: &RegisterRequest<'_>) -> Result<(), RemoteError> {
            assert!(request.selfie_data_url.starts_with("data:image/"));
            self.calls.lock().unwrap().push("register");
            std::thread::sleep(self.delay);
            match &self.register_result {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        fn generate_code(&self) -> Result<GenerateCodeResponse, RemoteError> {
            self.calls.lock().unwrap().push("generate-code");
            self.code_result.clone().unwrap_or_else(|| {
                Ok(GenerateCodeResponse {
                    code: Some("1234".into()),
                    raw_output: None,
                })
            })
        }
    }

    fn snapshot() -> Result<Snapshot> {
        let mut device = SyntheticDevice::from_settings(&CameraSettings {
            url: "stub://pipeline".into(),
            width: 4,
            height: 4,
        })?;
        let mut session = CameraSession::start(&mut device)?;
        Ok(SnapshotCapture::default().capture(&mut session)?)
    }

    fn pipeline(service: FakeService) -> Result<SubmissionPipeline<Arc<FakeService>>> {
        let announcer = ProgressAnnouncer::new(vec!["working".into()], Duration::from_millis(5))?;
        Ok(SubmissionPipeline::new(Arc::new(service), announcer))
    }

    fn quiet() -> StatusSink {
        Arc::new(|_: &str| {})
    }

    #[test]
    fn happy_path_makes_two_calls_in_order() -> Result<()> {
        let pipeline = pipeline(FakeService::default())?;
        let snap = snapshot()?;
        let code = pipeline.submit("user@test.com", Some(&snap), quiet())?;
        assert_eq!(code, "1234");
        assert_eq!(pipeline.service().calls(), vec!["register", "generate-code"]);
        assert_eq!(pipeline.announcer().stats().running(), 0);
        assert_eq!(pipeline.announcer().stats().begun, 1);
        Ok(())
    }

    #[test]
    fn validation_failures_make_no_calls() -> Result<()> {
        let pipeline = pipeline(FakeService::default())?;
        let snap = snapshot()?;

        let err = pipeline.submit("a@b", Some(&snap), quiet()).unwrap_err();
        assert_eq!(err, SubmitError::Validation(ValidationError::InvalidEmail));

        let err = pipeline.submit("a@b.co", None, quiet()).unwrap_err();
        assert_eq!(err, SubmitError::Validation(ValidationError::MissingSnapshot));

        assert!(pipeline.service().calls().is_empty());
        assert_eq!(pipeline.announcer().stats().begun, 0);
        assert!(!pipeline.is_in_flight());
        Ok(())
    }

    #[test]
    fn registration_failure_skips_code_generation() -> Result<()> {
        let pipeline = pipeline(FakeService {
            register_result: Some(RemoteError::Status { code: 500 }),
            ..FakeService::default()
        })?;
        let snap = snapshot()?;
        let err = pipeline.submit("user@test.com", Some(&snap), quiet()).unwrap_err();
        assert!(matches!(err, SubmitError::Registration(RemoteError::Status { code: 500 })));
        assert_eq!(pipeline.service().calls(), vec!["register"]);
        assert_eq!(pipeline.announcer().stats().begun, 1);
        assert_eq!(pipeline.announcer().stats().ended, 1);
        Ok(())
    }

    #[test]
    fn unreachable_registration_is_not_partial_success() -> Result<()> {
        let pipeline = pipeline(FakeService {
            register_result: Some(RemoteError::Transport("connection refused".into())),
            ..FakeService::default()
        })?;
        let snap = snapshot()?;
        let result = pipeline.submit("user@test.com", Some(&snap), quiet());
        assert!(matches!(
            &result,
            Err(SubmitError::Registration(RemoteError::Transport(_)))
        ));
        assert_eq!(pipeline.service().calls(), vec!["register"]);

        let state = SubmissionState::from_result(&result);
        assert!(!state.is_partial_success());
        assert_eq!(state.message(), Some(MSG_REGISTRATION_FAILED));
        assert!(!pipeline.is_in_flight());
        Ok(())
    }

    #[test]
    fn code_failure_is_partial_success() -> Result<()> {
        let pipeline = pipeline(FakeService {
            code_result: Some(Err(RemoteError::Transport("connection reset".into()))),
            ..FakeService::default()
        })?;
        let snap = snapshot()?;
        let result = pipeline.submit("user@test.com", Some(&snap), quiet());
        let state = SubmissionState::from_result(&result);
        assert!(state.is_partial_success());
        assert_eq!(state.message(), Some(MSG_CODE_UNAVAILABLE));
        assert_ne!(MSG_CODE_UNAVAILABLE, MSG_REGISTRATION_FAILED);
        assert_eq!(pipeline.announcer().stats().running(), 0);
        Ok(())
    }

    #[test]
    fn missing_code_uses_placeholder() -> Result<()> {
        let pipeline = pipeline(FakeService {
            code_result: Some(Ok(GenerateCodeResponse::default())),
            ..FakeService::default()
        })?;
        let snap = snapshot()?;
        let code = pipeline.submit("user@test.com", Some(&snap), quiet())?;
        assert_eq!(code, CODE_PLACEHOLDER);
        assert!(success_message(&code).contains(CODE_PLACEHOLDER));
        Ok(())
    }

    #[test]
    fn concurrent_submit_is_rejected() -> Result<()> {
        let pipeline = Arc::new(pipeline(FakeService {
            delay: Duration::from_millis(200),
            ..FakeService::default()
        })?);
        let snap = Arc::new(snapshot()?);

        let first = {
            let pipeline = pipeline.clone();
            let snap = snap.clone();
            std::thread::spawn(move || pipeline.submit("user@test.com", Some(&*snap), quiet()))
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !pipeline.is_in_flight() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        let second = pipeline.submit("other@test.com", Some(&*snap), quiet());
        assert_eq!(second.unwrap_err(), SubmitError::InFlight);

        let first = first.join().map_err(|_| anyhow::anyhow!("submit thread panicked"))?;
        assert_eq!(first?, "1234");
        assert_eq!(pipeline.service().calls(), vec!["register", "generate-code"]);
        assert!(!pipeline.is_in_flight());
        Ok(())
    }

    #[test]
    fn status_messages_reach_the_sink() -> Result<()> {
        let pipeline = pipeline(FakeService {
            delay: Duration::from_millis(60),
            ..FakeService::default()
        })?;
        let snap = snapshot()?;
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let store = seen.clone();
        pipeline.submit(
            "user@test.com",
            Some(&snap),
            Arc::new(move |msg: &str| store.lock().unwrap().push(msg.to_string())),
        )?;
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|msg| msg == "working"));
        Ok(())
    }
}
