use std::fmt;

use crate::events::DonePayload;

/// Human-readable session status shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    InputReceived,
    Restarting,
    Streaming,
    Stopping,
    /// Natural completion
    Completed { code: Option<i32> },
    /// Aborted or non-zero exit
    Exited { code: Option<i32> },
    Error(String),
    Unavailable,
    SourceEmpty,
    Cleared,
}

impl Status {
    /// Terminal status for a `done` event
    pub fn from_done(payload: &DonePayload) -> Self {
        if payload.ok {
            Self::Completed { code: payload.code }
        } else {
            Self::Exited { code: payload.code }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Unavailable)
    }
}

fn code_text(code: &Option<i32>) -> String {
    code.map_or_else(|| "?".to_string(), |c| c.to_string())
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready."),
            Self::InputReceived => write!(f, "Input received."),
            Self::Restarting => write!(f, "Restarting..."),
            Self::Streaming => write!(f, "Streaming..."),
            Self::Stopping => write!(f, "Stopping..."),
            Self::Completed { code } => write!(f, "Completed (code: {}).", code_text(code)),
            Self::Exited { code } => write!(f, "Exited (code: {}).", code_text(code)),
            Self::Error(message) => write!(f, "Error: {}", message),
            Self::Unavailable => write!(f, "Backend unavailable."),
            Self::SourceEmpty => write!(f, "Source text is empty."),
            Self::Cleared => write!(f, "Cleared."),
        }
    }
}
