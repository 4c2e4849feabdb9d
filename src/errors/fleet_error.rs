use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetErrorKind {
    Config,
    NotFound,
    Denied,
    Timeout,
    Transport,
    Io,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetError {
    pub kind: FleetErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl FleetError {
    pub fn new(kind: FleetErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
            retryable: matches!(kind, FleetErrorKind::Timeout | FleetErrorKind::Transport),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Config, "CONFIG", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::NotFound, "NOT_FOUND", message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Denied, "DENIED", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Transport, "TRANSPORT", message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Io, "IO", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Internal, "INTERNAL", message)
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for FleetError {}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::io(err.to_string())
    }
}
