//! Assertion helpers for scenario code.

use crate::error::{Error, FailureKind, Result};
use std::fmt::Debug;
use std::future::Future;
use tracing::{info, warn};

/// Fail with an assertion error unless `condition` holds.
///
/// # Errors
///
/// Returns `Error::Assertion` carrying `message`.
pub fn ensure(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::assertion(message))
    }
}

/// Fail with an assertion error unless `actual == expected`.
///
/// # Errors
///
/// Returns `Error::Assertion` showing both values.
pub fn ensure_eq<T: PartialEq + Debug>(actual: T, expected: T, message: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "{message} ({actual:?} != {expected:?})"
        )))
    }
}

/// Expect `result` to be a failure of one of `kinds`; returns the error.
///
/// # Errors
///
/// Returns `Error::Assertion` if the call succeeded, and the original error
/// if it failed with a different classification.
pub fn expect_failure<T: Debug>(
    result: Result<T>,
    kinds: &[FailureKind],
    message: &str,
) -> Result<Error> {
    match result {
        Ok(value) => Err(Error::assertion(format!(
            "{message}: call unexpectedly succeeded with {value:?}"
        ))),
        Err(e) if kinds.contains(&e.kind()) => {
            info!("Expected failure: {}", e);
            Ok(e)
        }
        Err(e) => Err(e),
    }
}

/// A named expectation that can be switched off without changing which calls
/// the scenario makes.
#[derive(Debug, Clone)]
pub struct Check {
    name: String,
    disabled: Option<String>,
}

impl Check {
    /// An active check.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: None,
        }
    }

    /// A check that logs instead of failing.
    pub fn disabled(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled: Some(reason.into()),
        }
    }

    /// Name of the check.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether failures are reported.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.disabled.is_none()
    }

    /// Gate the outcome of an assertion on this check.
    ///
    /// # Errors
    ///
    /// Returns the assertion error while the check is enabled.
    pub fn apply(&self, outcome: Result<()>) -> Result<()> {
        match (outcome, &self.disabled) {
            (Ok(()), _) => Ok(()),
            (Err(e), None) => Err(e),
            (Err(e), Some(reason)) => {
                warn!("Check '{}' is disabled ({}); ignoring: {}", self.name, reason, e);
                Ok(())
            }
        }
    }

    /// [`ensure_eq`] gated on this check.
    ///
    /// # Errors
    ///
    /// As [`ensure_eq`], while the check is enabled.
    pub fn ensure_eq<T: PartialEq + Debug>(&self, actual: T, expected: T) -> Result<()> {
        self.apply(ensure_eq(actual, expected, &self.name))
    }

    /// Run `wait` and gate its timeout on this check.
    ///
    /// # Errors
    ///
    /// Returns a timeout while the check is enabled, and any other error
    /// regardless.
    pub async fn wait<F>(&self, wait: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match wait.await {
            Err(e) if e.kind() == FailureKind::Timeout => self.apply(Err(e)),
            other => other,
        }
    }
}
