//! The single result of a test run.

use crate::config::NodeKind;
use crate::error::{Error, FailureKind};
use std::any::Any;
use std::fmt;

/// Lifecycle stages, entered in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Validating configuration, creating the working directory.
    Configuring,
    /// Writing data directories and config files for a tier.
    Bootstrapping(NodeKind),
    /// Starting and wiring a tier's node set.
    NetworkUp(NodeKind),
    /// Scenario body.
    Running,
    /// Stopping nodes and cleaning up.
    TearingDown,
    /// Outcome produced.
    Reported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuring => f.write_str("configuring"),
            Self::Bootstrapping(kind) => write!(f, "bootstrapping {kind}"),
            Self::NetworkUp(kind) => write!(f, "starting {kind} network"),
            Self::Running => f.write_str("running"),
            Self::TearingDown => f.write_str("tearing down"),
            Self::Reported => f.write_str("reported"),
        }
    }
}

/// A classified failure.
#[derive(Debug, Clone)]
pub struct Failure {
    /// Classification.
    pub kind: FailureKind,
    /// Human readable message.
    pub message: String,
    /// Stage in which the failure surfaced.
    pub stage: Stage,
    /// Error chain, outermost first.
    pub trace: Vec<String>,
}

impl Failure {
    /// Classify an error raised during `stage`.
    #[must_use]
    pub fn from_error(err: &Error, stage: Stage) -> Self {
        let message = match err {
            Error::Api { method, .. } => {
                format!("{method}: {}", err.api_message().unwrap_or_default())
            }
            Error::Timeout { operation, elapsed } => format!("{operation} (after {elapsed:?})"),
            other => other.to_string(),
        };

        let mut trace = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            trace.push(cause.to_string());
            source = cause.source();
        }

        Self {
            kind: err.kind(),
            message,
            stage,
            trace,
        }
    }

    /// Classify a panic payload caught during `stage`.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send), stage: Stage) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string());
        Self {
            kind: FailureKind::Unclassified,
            message: format!("panicked: {message}"),
            stage,
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.message)
    }
}

/// Outcome of one run, produced once after teardown.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Scenario name.
    pub scenario: String,
    /// Classified failure, if any.
    pub failure: Option<Failure>,
    /// Whether teardown completed without problems.
    pub teardown_clean: bool,
}

impl TestOutcome {
    /// Whether the scenario passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Process exit status: 0 on success, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.success())
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => f.write_str("Test successful"),
            Some(failure) => {
                writeln!(f, "{failure}")?;
                writeln!(f, "  while {}", failure.stage)?;
                for cause in &failure.trace {
                    writeln!(f, "  caused by: {cause}")?;
                }
                f.write_str("Failed")
            }
        }
    }
}
