//! # Error Handling
//!
//! Error kinds mirror the streaming server's failure surface one-for-one:
//! startup-fatal device/display errors, session-fatal errors that drop the
//! current client and return to listening, and the handful of conditions
//! that are programming bugs rather than runtime states (`abort`).
//!
//! Adapted from a richer, general-purpose `CaptureError`/`ErrorContext`
//! design; trimmed down to the exact kinds the streaming pipeline raises,
//! since every variant here corresponds to one documented failure mode
//! rather than a generic bucket.

use std::fmt;
use std::time::SystemTime;

/// Whether an error should end the process or just the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Ends the process with a non-zero exit code.
    StartupFatal,
    /// Drops the current client and returns the session loop to `Listening`.
    SessionFatal,
}

/// Context attached to every `StreamError`: when it happened and which
/// platform call raised it, for the log line a human reads afterward.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    /// Name of the originating syscall/ioctl/EGL/VA-API entry point.
    pub operation: &'static str,
    pub detail: String,
}

impl ErrorContext {
    pub fn new(operation: &'static str, detail: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.detail)
    }
}

/// A stable VA_STATUS_ERROR_* string, kept for log reproducibility without
/// depending on the exact numeric value the driver returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaStatus(pub i32);

impl fmt::Display for VaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA_STATUS(0x{:08x})", self.0)
    }
}

#[derive(Debug)]
pub enum StreamError {
    /// DRM open, VA-API init, EGL init, or shader compile failed.
    DeviceUnavailable(ErrorContext),
    /// No CRTC has a usable framebuffer.
    NoDisplay(ErrorContext),
    /// The current framebuffer's format or modifier isn't supported by EGL.
    ImportError { context: ErrorContext, supported_fourccs: Vec<String> },
    /// A GL call failed (shader link, FBO incomplete, `glGetError`).
    GlError(ErrorContext),
    /// A VA-API call failed.
    VaError { status: VaStatus, context: ErrorContext },
    /// Writing to the client socket hit EPIPE or an unrecoverable short write.
    SinkClosed(ErrorContext),
    /// The audio thread reported unrecoverable failure through the wake pipe.
    AudioError(ErrorContext),
    /// Wraps an I/O error that doesn't fit a more specific kind above.
    Io(std::io::Error),
    /// CLI / configuration validation failure.
    Config(String),
}

impl StreamError {
    pub fn severity(&self) -> Severity {
        match self {
            StreamError::DeviceUnavailable(_) | StreamError::NoDisplay(_) | StreamError::Config(_) => {
                Severity::StartupFatal
            }
            StreamError::ImportError { .. }
            | StreamError::GlError(_)
            | StreamError::VaError { .. }
            | StreamError::SinkClosed(_)
            | StreamError::AudioError(_)
            | StreamError::Io(_) => Severity::SessionFatal,
        }
    }

    pub fn is_session_fatal(&self) -> bool {
        self.severity() == Severity::SessionFatal
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::DeviceUnavailable(ctx) => write!(f, "device unavailable: {ctx}"),
            StreamError::NoDisplay(ctx) => write!(f, "no usable display: {ctx}"),
            StreamError::ImportError { context, supported_fourccs } => write!(
                f,
                "dma-buf import failed: {context} (supported fourccs: {})",
                supported_fourccs.join(", ")
            ),
            StreamError::GlError(ctx) => write!(f, "GL error: {ctx}"),
            StreamError::VaError { status, context } => write!(f, "VA-API error {status}: {context}"),
            StreamError::SinkClosed(ctx) => write!(f, "client sink closed: {ctx}"),
            StreamError::AudioError(ctx) => write!(f, "audio subsystem error: {ctx}"),
            StreamError::Io(e) => write!(f, "I/O error: {e}"),
            StreamError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StreamError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_fatal_errors_do_not_include_startup_kinds() {
        let err = StreamError::SinkClosed(ErrorContext::new("write", "EPIPE"));
        assert!(err.is_session_fatal());

        let err = StreamError::NoDisplay(ErrorContext::new("GETRESOURCES", "no CRTC"));
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn display_includes_operation_name() {
        let err = StreamError::GlError(ErrorContext::new("glLinkProgram", "link failed"));
        let msg = err.to_string();
        assert!(msg.contains("glLinkProgram"));
    }
}
