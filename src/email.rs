//! Email input and syntactic validation.

use regex::Regex;
use std::sync::OnceLock;

/// `local@domain.tld`: no whitespace, exactly one `@`, at least one dot in
/// the domain. Syntax only; deliverability is the backend's problem.
fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

pub fn validate_email(candidate: &str) -> bool {
    email_pattern().is_match(candidate)
}

/// Mask an address for logs: `user@test.com` → `u***@test.com`.
pub fn mask_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Free-text address as typed. Validity is only re-derived on submit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailInput {
    value: String,
    valid: Option<bool>,
}

impl EmailInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the text (one keystroke or a paste). Clears the last verdict.
    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.valid = None;
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Re-run validation and remember the verdict.
    pub fn validate(&mut self) -> bool {
        let valid = validate_email(&self.value);
        self.valid = Some(valid);
        valid
    }

    /// Verdict of the last `validate()`, `None` if edited since.
    pub fn last_verdict(&self) -> Option<bool> {
        self.valid
    }
}
