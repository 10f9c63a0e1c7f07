//! Remote registration service client.
//!
//! Two endpoints, addressed relative to a configurable base URL:
//! - `POST /api/register` with `{ "email", "selfieDataUrl" }`; any 2xx accepts
//! - `POST /api/generate-code` with no body; 2xx carries `{ "code"? }`
//!
//! `GET /health` is used only as an optional preflight.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;
use url::Url;

use crate::error::RemoteError;

const REGISTER_PATH: &str = "api/register";
const GENERATE_CODE_PATH: &str = "api/generate-code";
const HEALTH_PATH: &str = "health";
const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    #[serde(rename = "selfieDataUrl")]
    pub selfie_data_url: &'a str,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerateCodeResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "rawOutput")]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The request/response contract consumed by `SubmissionPipeline`.
///
/// Both calls block until a response or a transport failure.
pub trait RegistrationService: Send + Sync {
    fn register(&self, request: &RegisterRequest<'_>) -> Result<(), RemoteError>;

    fn generate_code(&self) -> Result<GenerateCodeResponse, RemoteError>;
}

impl<T: RegistrationService + ?Sized> RegistrationService for std::sync::Arc<T> {
    fn register(&self, request: &RegisterRequest<'_>) -> Result<(), RemoteError> {
        (**self).register(request)
    }

    fn generate_code(&self) -> Result<GenerateCodeResponse, RemoteError> {
        (**self).generate_code()
    }
}

/// Blocking HTTP client for the registration backend.
#[derive(Clone, Debug)]
pub struct HttpRegistrationService {
    base: Url,
    agent: ureq::Agent,
}

impl HttpRegistrationService {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            base: normalize_base(base_url)?,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|err| RemoteError::Transport(format!("bad endpoint {}: {}", path, err)))
    }

    pub fn health(&self) -> Result<HealthResponse, RemoteError> {
        let url = self.endpoint(HEALTH_PATH)?;
        let response = self.agent.get(url.as_str()).call().map_err(map_ureq_error)?;
        let body = read_body(response)?;
        serde_json::from_str(&body).map_err(|err| RemoteError::Decode(err.to_string()))
    }
}

impl RegistrationService for HttpRegistrationService {
    fn register(&self, request: &RegisterRequest<'_>) -> Result<(), RemoteError> {
        let url = self.endpoint(REGISTER_PATH)?;
        let body =
            serde_json::to_string(request).map_err(|err| RemoteError::Decode(err.to_string()))?;
        self.agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(map_ureq_error)?;
        Ok(())
    }

    fn generate_code(&self) -> Result<GenerateCodeResponse, RemoteError> {
        let url = self.endpoint(GENERATE_CODE_PATH)?;
        let response = self
            .agent
            .post(url.as_str())
            .set("Content-Type", "application/json")
            .call()
            .map_err(map_ureq_error)?;
        let body = read_body(response)?;
        parse_code_body(&body)
    }
}

/// A 2xx reply without a JSON object (empty, `null`, array, scalar) carries
/// no code and resolves to the placeholder. Only unparsable text is an error.
fn parse_code_body(body: &str) -> Result<GenerateCodeResponse, RemoteError> {
    if body.trim().is_empty() {
        return Ok(GenerateCodeResponse::default());
    }
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|err| RemoteError::Decode(err.to_string()))?;
    if !value.is_object() {
        log::debug!("generate-code reply is not an object: {}", value);
        return Ok(GenerateCodeResponse::default());
    }
    serde_json::from_value(value).map_err(|err| RemoteError::Decode(err.to_string()))
}

/// Force a trailing slash so `join` appends instead of replacing the last
/// path segment (`https://host/app` → `https://host/app/api/register`).
fn normalize_base(base_url: &str) -> anyhow::Result<Url> {
    let mut base = Url::parse(base_url)
        .map_err(|err| anyhow::anyhow!("invalid backend url '{}': {}", base_url, err))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow::anyhow!(
            "backend url must be http(s), got '{}'",
            base.scheme()
        ));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

fn map_ureq_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, _) => RemoteError::Status { code },
        ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
    }
}

fn read_body(response: ureq::Response) -> Result<String, RemoteError> {
    let mut body = String::new();
    response
        .into_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_string(&mut body)
        .map_err(|err| RemoteError::Transport(err.to_string()))?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_under_the_base_path() -> anyhow::Result<()> {
        let service = HttpRegistrationService::new("https://example.org/app", Duration::from_secs(1))?;
        assert_eq!(
            service.endpoint(REGISTER_PATH)?.as_str(),
            "https://example.org/app/api/register"
        );

        let root = HttpRegistrationService::new("http://localhost:8000", Duration::from_secs(1))?;
        assert_eq!(
            root.endpoint(GENERATE_CODE_PATH)?.as_str(),
            "http://localhost:8000/api/generate-code"
        );
        Ok(())
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(HttpRegistrationService::new("ftp://example.org", Duration::from_secs(1)).is_err());
        assert!(HttpRegistrationService::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn register_request_uses_wire_names() -> anyhow::Result<()> {
        let request = RegisterRequest {
            email: "user@test.com",
            selfie_data_url: "data:image/png;base64,AAAA",
        };
        let json: serde_json::Value = serde_json::to_value(&request)?;
        assert_eq!(json["email"], "user@test.com");
        assert_eq!(json["selfieDataUrl"], "data:image/png;base64,AAAA");
        Ok(())
    }

    #[test]
    fn code_field_is_optional() -> anyhow::Result<()> {
        let parsed: GenerateCodeResponse = serde_json::from_str(r#"{"rawOutput":"x"}"#)?;
        assert_eq!(parsed.code, None);
        let parsed: GenerateCodeResponse = serde_json::from_str(r#"{"code":"1234"}"#)?;
        assert_eq!(parsed.code.as_deref(), Some("1234"));
        Ok(())
    }

    #[test]
    fn code_body_without_an_object_has_no_code() -> anyhow::Result<()> {
        for body in ["", "  ", "null", "[]", "\"1234\"", "42"] {
            assert_eq!(parse_code_body(body)?, GenerateCodeResponse::default(), "{body:?}");
        }
        assert_eq!(parse_code_body(r#"{"code":"9876"}"#)?.code.as_deref(), Some("9876"));
        Ok(())
    }

    #[test]
    fn unparsable_code_body_is_a_decode_error() {
        assert!(matches!(
            parse_code_body("<html>bad gateway</html>"),
            Err(RemoteError::Decode(_))
        ));
        assert!(matches!(
            parse_code_body(r#"{"code":["1234"]}"#),
            Err(RemoteError::Decode(_))
        ));
    }
}
