//! Error types for fleet server operations.
//!
//! Every remote call returns [`Result`]. The two failure shapes that matter to
//! callers are kept apart: a [`Error::Fault`] means the server answered and
//! rejected the call, while [`Error::Transport`] means no answer arrived at all.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for fleet server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of fleet server errors.
///
/// Categories let callers decide whether a failure is confined to one system
/// or whether no further call can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The server rejected the call.
    Remote,
    /// Connectivity or TLS failure.
    Transport,
    /// A named system, group or record does not exist.
    NotFound,
    /// No usable session.
    Session,
    /// The server answered with something we could not decode.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether no further remote call can be expected to succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport | Self::Session)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Remote => "Server rejected the request",
            Self::Transport => "Could not reach the server",
            Self::NotFound => "Not found on the server",
            Self::Session => "Not logged in",
            Self::Format => "Unexpected server response",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Remote => "Check the fault message and the server's audit log",
            Self::Transport => "Check api_url, network access and TLS settings in the config file",
            Self::NotFound => "Verify the system or group name registered on the server",
            Self::Session => "Run 'sumactl user --login' or check the credentials in the config file",
            Self::Format => "The server API version may not be supported",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the fleet server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server rejected the call.
    #[error("fault {code} in {method}: {message}")]
    Fault {
        /// Remote method that faulted.
        method: String,
        /// Fault code reported by the server.
        code: i32,
        /// Fault message reported by the server.
        message: String,
    },

    /// Connectivity, DNS or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded.
    #[error("invalid response from {method}: {message}")]
    InvalidResponse {
        /// Remote method whose response was malformed.
        method: String,
        /// Decoder message.
        message: String,
    },

    /// A system name resolved to zero systems.
    #[error("no such system: {0}")]
    UnknownSystem(String),

    /// A call that needs a session was made before login.
    #[error("not logged in")]
    NotLoggedIn,

    /// Login was refused or the session store is unusable.
    #[error("session error: {0}")]
    Session(String),

    /// IO error while reading or writing the session store.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Create a fault error.
    pub fn fault(method: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::Fault {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-response error.
    pub fn invalid_response(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Fault { .. } => ErrorCategory::Remote,
            Error::Transport(_) => ErrorCategory::Transport,
            Error::InvalidResponse { .. } => ErrorCategory::Format,
            Error::UnknownSystem(_) => ErrorCategory::NotFound,
            Error::NotLoggedIn | Error::Session(_) => ErrorCategory::Session,
            Error::Io { .. } => ErrorCategory::Other,
        }
    }

    /// Whether no further remote call can be expected to succeed.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.category().is_fatal()
    }

    /// Fault code and message, if the server rejected the call.
    #[must_use]
    pub fn as_fault(&self) -> Option<(i32, &str)> {
        match self {
            Error::Fault { code, message, .. } => Some((*code, message.as_str())),
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
