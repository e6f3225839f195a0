//! Error types for twinchain-harness.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a test network.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection-level failure during an RPC call (after the retry budget).
    #[error("transport error calling {method}: {message}")]
    Transport {
        /// Method path that was being invoked.
        method: String,
        /// Transport failure description.
        message: String,
    },

    /// Well-formed error response from a node API.
    #[error("API error from {method}: {payload}")]
    Api {
        /// Method path that was being invoked.
        method: String,
        /// HTTP status, when the error was signalled by status code.
        status: Option<u16>,
        /// Raw server-provided error payload.
        payload: String,
    },

    /// A bounded wait exceeded its timeout.
    #[error("timeout while {operation} (after {elapsed:?})")]
    Timeout {
        /// Name of the awaited operation.
        operation: String,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// Scenario-level expectation violated.
    #[error("{0}")]
    Assertion(String),

    /// A node of a set failed to start.
    #[error("node {node} failed to start: {source}")]
    Startup {
        /// Node label, e.g. `mc-node2`.
        node: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything else, including panics caught at the lifecycle boundary.
    #[error("{0}")]
    Unclassified(String),
}

impl Error {
    /// Classify this error into the bounded failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. } => FailureKind::Transport,
            Self::Api { .. } => FailureKind::Api,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Assertion(_) => FailureKind::Assertion,
            Self::Startup { source, .. } => source.kind(),
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Unclassified(_) => {
                FailureKind::Unclassified
            }
        }
    }

    /// Whether this is an RPC-level error (transport or API).
    #[must_use]
    pub fn is_rpc(&self) -> bool {
        matches!(self.kind(), FailureKind::Transport | FailureKind::Api)
    }

    /// Human readable message for a JSON-RPC or REST error payload.
    ///
    /// JSON-RPC error objects carry a `message` member; anything else is
    /// returned verbatim.
    #[must_use]
    pub fn api_message(&self) -> Option<String> {
        let Self::Api { payload, .. } = self else {
            return None;
        };
        let message = serde_json::from_str::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str().map(str::to_owned)));
        Some(message.unwrap_or_else(|| payload.clone()))
    }

    /// Build an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Build a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Bounded failure classification reported by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection-level RPC failure.
    Transport,
    /// Node API returned an error.
    Api,
    /// Convergence or startup wait timed out.
    Timeout,
    /// Scenario assertion failed.
    Assertion,
    /// Anything else.
    Unclassified,
}

impl FailureKind {
    /// Prefix used in the failure summary line.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Transport => "RPC transport error",
            Self::Api => "API error",
            Self::Timeout => "Timeout while",
            Self::Assertion => "Assertion failed",
            Self::Unclassified => "Unexpected error caught during testing",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
