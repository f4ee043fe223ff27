//! Error types shared across Phoneframe crates.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for Phoneframe operations.
#[derive(Debug, thiserror::Error)]
pub enum PhoneframeError {
    #[error("No source video loaded")]
    NoSourceLoaded,

    #[error("An export session is already active")]
    SessionBusy,

    #[error("No supported codec among candidates: {}", candidates.join(", "))]
    NoSupportedCodec { candidates: Vec<String> },

    #[error("Capture surface unavailable: {message}")]
    CaptureUnavailable { message: String },

    #[error("Encoder fault: {message}")]
    EncoderFault { message: String },

    #[error("Transient frame read error: {message}")]
    TransientFrameRead { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using PhoneframeError.
pub type PhoneframeResult<T> = Result<T, PhoneframeError>;

/// Coarse classification reported when a session fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoSourceLoaded,
    SessionBusy,
    NoSupportedCodec,
    CaptureUnavailable,
    EncoderFault,
    TransientFrameRead,
    /// Anything outside the session taxonomy (I/O, config, ...).
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoSourceLoaded => "no-source-loaded",
            ErrorKind::SessionBusy => "session-busy",
            ErrorKind::NoSupportedCodec => "no-supported-codec",
            ErrorKind::CaptureUnavailable => "capture-unavailable",
            ErrorKind::EncoderFault => "encoder-fault",
            ErrorKind::TransientFrameRead => "transient-frame-read",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PhoneframeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSourceLoaded => ErrorKind::NoSourceLoaded,
            Self::SessionBusy => ErrorKind::SessionBusy,
            Self::NoSupportedCodec { .. } => ErrorKind::NoSupportedCodec,
            Self::CaptureUnavailable { .. } => ErrorKind::CaptureUnavailable,
            Self::EncoderFault { .. } => ErrorKind::EncoderFault,
            Self::TransientFrameRead { .. } => ErrorKind::TransientFrameRead,
            _ => ErrorKind::Internal,
        }
    }

    pub fn capture_unavailable(msg: impl Into<String>) -> Self {
        Self::CaptureUnavailable {
            message: msg.into(),
        }
    }

    pub fn encoder_fault(msg: impl Into<String>) -> Self {
        Self::EncoderFault {
            message: msg.into(),
        }
    }

    pub fn transient_frame_read(msg: impl Into<String>) -> Self {
        Self::TransientFrameRead {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
