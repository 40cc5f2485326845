use thiserror::Error;

use crate::domain::insight::InsightStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid insight transition from {from:?} to {to:?}")]
    InvalidInsightTransition { from: InsightStatus, to: InsightStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure classes for calls into the generative-content service.
///
/// None of these are retried; the caller reports the failure once and the
/// affected operation produces no output.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("content service rejected credentials: {0}")]
    Auth(String),
    #[error("content service quota exhausted: {0}")]
    Quota(String),
    #[error("content service unreachable: {0}")]
    Transport(String),
    #[error("malformed content response: {0}")]
    MalformedResponse(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("partial apply: {applied} of {attempted} price updates written before `{failed_article}` failed: {reason}")]
    PartialApply { applied: usize, attempted: usize, failed_article: String, reason: String },
}

impl EngineError {
    pub fn storage(error: impl std::fmt::Display) -> Self {
        Self::Storage(error.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Short human-readable message for the presentation layer. Failure
    /// detail stays in logs; the user sees one sentence per class.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Domain(_) | Self::Validation(_) => {
                "This recommendation could not be applied. It may reference items that no longer exist."
            }
            Self::Generation(GenerationError::Auth(_)) => {
                "The recommendation service rejected the configured credentials."
            }
            Self::Generation(GenerationError::Quota(_)) => {
                "The recommendation service quota is exhausted. Try again later."
            }
            Self::Generation(_) => {
                "Recommendations could not be generated right now. Try again later."
            }
            Self::Storage(_) => "Saved recommendations are temporarily unavailable.",
            Self::PartialApply { .. } => {
                "Some price updates were applied before an error occurred. Review item prices."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::insight::InsightStatus;
    use crate::errors::{DomainError, EngineError, GenerationError};

    #[test]
    fn failed_transition_maps_to_actionable_message() {
        let error = EngineError::from(DomainError::InvalidInsightTransition {
            from: InsightStatus::Dismissed,
            to: InsightStatus::Active,
        });

        assert_eq!(
            error.user_message(),
            "This recommendation could not be applied. It may reference items that no longer exist."
        );
    }

    #[test]
    fn quota_failure_has_dedicated_message() {
        let error = EngineError::from(GenerationError::Quota("429 too many requests".to_owned()));
        assert_eq!(
            error.user_message(),
            "The recommendation service quota is exhausted. Try again later."
        );
    }

    #[test]
    fn partial_apply_reports_progress() {
        let error = EngineError::PartialApply {
            applied: 2,
            attempted: 4,
            failed_article: "art-3".to_owned(),
            reason: "database lock timeout".to_owned(),
        };

        let rendered = error.to_string();
        assert!(rendered.contains("2 of 4"));
        assert!(rendered.contains("art-3"));
    }
}
