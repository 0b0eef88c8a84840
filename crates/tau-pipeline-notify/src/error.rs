use std::fmt;

use thiserror::Error;

/// Result type for notification reconciliation.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors raised while reconciling a pipeline notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("pipeline activity name cannot be empty")]
    EmptyActivityName,
    #[error("activity '{activity}' is invalid: {reason}")]
    InvalidActivity { activity: String, reason: String },
    #[error("activity '{activity}' has non-numeric build number '{value}'")]
    InvalidBuildNumber { activity: String, value: String },
    #[error("activity '{activity}' has invalid pull request branch '{branch}'")]
    InvalidPullRequestNumber { activity: String, branch: String },
    #[error("{0}")]
    InvalidInput(String),
    #[error("{operation} failed for '{target}': {source:#}")]
    Collaborator {
        operation: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(
        "{} notification target(s) failed for '{activity}': {}",
        failures.len(),
        summarize_failures(failures)
    )]
    Targets {
        activity: String,
        failures: Vec<TargetFailure>,
    },
}

impl NotifyError {
    pub(crate) fn collaborator(
        operation: &'static str,
        target: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Collaborator {
            operation,
            target: target.into(),
            source,
        }
    }
}

/// One failed target of a multi-target operation.
#[derive(Debug)]
pub struct TargetFailure {
    pub target: String,
    pub operation: &'static str,
    pub error: anyhow::Error,
}

impl TargetFailure {
    pub fn new(target: impl Into<String>, operation: &'static str, error: anyhow::Error) -> Self {
        Self {
            target: target.into(),
            operation,
            error,
        }
    }
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {:#}", self.operation, self.target, self.error)
    }
}

fn summarize_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
