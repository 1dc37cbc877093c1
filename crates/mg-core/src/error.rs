//! Unified error type for the mediagate pipeline.
//!
//! All crates funnel their failures into [`Error`]. Client faults
//! ([`Error::InvalidArgument`], [`Error::Decode`]) carry actionable messages;
//! tool and internal faults keep their diagnostics in structured fields and
//! expose only an opaque [`Error::public_message`] to end callers.

use std::fmt;
use std::time::Duration;

/// Diagnostics captured when an external tool fails.
///
/// `command_line` is for operator logs only. It is deliberately left out of
/// the `Display` output so it never reaches an end caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Short tool name (e.g. "ffmpeg").
    pub tool: String,
    /// Human-readable failure description.
    pub message: String,
    /// Process exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
    /// Whether the process was killed because stdout exceeded its ceiling.
    pub killed_by_ceiling: bool,
    /// Reconstructed command line.
    pub command_line: String,
}

impl ToolFailure {
    /// Create a failure with only a tool name and message.
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
            exit_code: None,
            signal: None,
            killed_by_ceiling: false,
            command_line: String::new(),
        }
    }

    /// Builder: attach the reconstructed command line.
    pub fn with_command_line(mut self, command_line: impl Into<String>) -> Self {
        self.command_line = command_line.into();
        self
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tool, self.message)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {code})")?;
        }
        if let Some(signal) = self.signal {
            write!(f, " (signal {signal})")?;
        }
        Ok(())
    }
}

/// Unified error type covering all failure modes in mediagate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A user-supplied token, parameter, or style name failed validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A store lookup found nothing.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "object", "style").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An external tool failed to spawn, exited non-zero, or was killed.
    #[error("Tool error {0}")]
    Tool(ToolFailure),

    /// An external tool wrote more than its output ceiling.
    #[error("Tool output overflow {0}")]
    Overflow(ToolFailure),

    /// The imaging library rejected unreadable or corrupt input.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An operation exceeded its wall-clock budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was running.
        operation: String,
        /// The budget that elapsed.
        after: Duration,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Suggested HTTP status code for the outer serving layer.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidArgument(_) => 400,
            Error::NotFound { .. } => 404,
            Error::Tool(_) => 502,
            Error::Overflow(_) => 507,
            Error::Decode(_) => 422,
            Error::Timeout { .. } => 504,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Whether the failure was caused by the request or its content.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_) | Error::NotFound { .. } | Error::Decode(_)
        )
    }

    /// Message safe to show to an end caller.
    ///
    /// Validation failures are returned verbatim; everything else is reduced
    /// to a generic description with no paths, stderr, or command lines.
    pub fn public_message(&self) -> String {
        match self {
            Error::InvalidArgument(_) | Error::NotFound { .. } => self.to_string(),
            Error::Decode(_) => "unable to decode source content".into(),
            Error::Tool(_) | Error::Overflow(_) => "media tool failed".into(),
            Error::Timeout { .. } => "processing timed out".into(),
            Error::Io { .. } | Error::Internal(_) => "internal error".into(),
        }
    }

    /// Tool diagnostics, if this is a tool or overflow failure.
    pub fn tool_failure(&self) -> Option<&ToolFailure> {
        match self {
            Error::Tool(f) | Error::Overflow(f) => Some(f),
            _ => None,
        }
    }

    /// Convenience constructor for [`Error::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool(ToolFailure::new(tool, message))
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
