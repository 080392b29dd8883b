//! Error types shared by the runner and the authentication helpers

use thiserror::Error;

/// Result type alias for stack-probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Expected-vs-actual mismatch raised inside a test body.
    #[error("{0}")]
    Assertion(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown service: {0}")]
    UnknownService(String),
}

impl ProbeError {
    pub fn assertion(message: impl Into<String>) -> Self {
        ProbeError::Assertion(message.into())
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        ProbeError::Http { status, body: body.into() }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, ProbeError::Assertion(_))
    }

    /// Status code carried by an HTTP error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProbeError::Http { status, .. } => Some(*status),
            ProbeError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<ldap3::LdapError> for ProbeError {
    fn from(err: ldap3::LdapError) -> Self {
        ProbeError::Directory(err.to_string())
    }
}

impl From<url::ParseError> for ProbeError {
    fn from(err: url::ParseError) -> Self {
        ProbeError::Configuration(format!("invalid URL: {}", err))
    }
}

/// Value produced by a best-effort operation, together with the side effects
/// that were skipped or failed along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct WithWarnings<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> WithWarnings<T> {
    pub fn new(value: T) -> Self {
        Self { value, warnings: Vec::new() }
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_exposes_status() {
        let err = ProbeError::http(401, "bad credentials");
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "HTTP 401: bad credentials");
        assert!(!err.is_assertion());
    }

    #[test]
    fn test_assertion_message_is_verbatim() {
        let err = ProbeError::assertion("expected 200 but was 404");
        assert!(err.is_assertion());
        assert_eq!(err.to_string(), "expected 200 but was 404");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_warnings_mark_degraded() {
        let mut outcome = WithWarnings::new(3);
        assert!(!outcome.is_degraded());
        outcome.warn("group 'admins' not found");
        assert!(outcome.is_degraded());
        assert_eq!(outcome.into_inner(), 3);
    }
}
