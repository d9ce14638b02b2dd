//! Failure kinds and the exit-code contract for terminal run states.

use thiserror::Error;

use crate::exit_codes;

/// The classified outcome of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    UsageLimit,
    Timeout,
    ProcessError,
    BinaryNotFound,
    MetadataError,
    CommitMissing,
    Unhandled,
}

impl FailureKind {
    pub fn exit_code(self) -> i32 {
        match self {
            FailureKind::UsageLimit => exit_codes::USAGE_LIMIT,
            FailureKind::Timeout => exit_codes::TIMEOUT,
            FailureKind::Unhandled => exit_codes::UNHANDLED,
            FailureKind::ProcessError
            | FailureKind::BinaryNotFound
            | FailureKind::MetadataError
            | FailureKind::CommitMissing => exit_codes::FAILURE,
        }
    }

    /// Short human label echoed to stderr.
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::UsageLimit => "RateLimitUsageError",
            FailureKind::Timeout => "TimeoutError",
            FailureKind::ProcessError => "ProcessError",
            FailureKind::BinaryNotFound => "BinaryNotFoundError",
            FailureKind::MetadataError => "MetadataError",
            FailureKind::CommitMissing => "CommitMissingError",
            FailureKind::Unhandled => "UnhandledError",
        }
    }

    /// The `classified_error` value persisted in the run record. Only
    /// usage-limit and timeout outcomes carry one.
    pub fn classified_error(self) -> Option<&'static str> {
        match self {
            FailureKind::UsageLimit => Some("usage_limit"),
            FailureKind::Timeout => Some("timeout"),
            _ => None,
        }
    }
}

/// A terminal run failure with its human-readable detail.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .kind.label(), .detail)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Recover the typed failure from an error chain. Anything without a
/// `RunFailure` in its chain lands in the `Unhandled` terminal.
pub fn failure_from(err: &anyhow::Error) -> RunFailure {
    for cause in err.chain() {
        if let Some(failure) = cause.downcast_ref::<RunFailure>() {
            return failure.clone();
        }
    }
    RunFailure::new(FailureKind::Unhandled, format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(FailureKind::UsageLimit.exit_code(), 10);
        assert_eq!(FailureKind::Timeout.exit_code(), 11);
        assert_eq!(FailureKind::ProcessError.exit_code(), 1);
        assert_eq!(FailureKind::BinaryNotFound.exit_code(), 1);
        assert_eq!(FailureKind::MetadataError.exit_code(), 1);
        assert_eq!(FailureKind::CommitMissing.exit_code(), 1);
        assert_eq!(FailureKind::Unhandled.exit_code(), 2);
    }

    #[test]
    fn only_limit_and_timeout_are_classified() {
        assert_eq!(
            FailureKind::UsageLimit.classified_error(),
            Some("usage_limit")
        );
        assert_eq!(FailureKind::Timeout.classified_error(), Some("timeout"));
        assert_eq!(FailureKind::CommitMissing.classified_error(), None);
        assert_eq!(FailureKind::Unhandled.classified_error(), None);
    }

    #[test]
    fn failure_displays_label_and_detail() {
        let failure = RunFailure::new(FailureKind::UsageLimit, "limit hit");
        assert_eq!(failure.to_string(), "RateLimitUsageError: limit hit");
    }

    #[test]
    fn failure_recovered_through_anyhow_chain() {
        let err = anyhow::Error::new(RunFailure::new(FailureKind::Timeout, "too slow"))
            .context("agent execution");
        let failure = failure_from(&err);
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.detail, "too slow");
    }

    #[test]
    fn plain_errors_become_unhandled() {
        let err = anyhow::anyhow!("exploded");
        let failure = failure_from(&err);
        assert_eq!(failure.kind, FailureKind::Unhandled);
        assert!(failure.detail.contains("exploded"));
    }
}
