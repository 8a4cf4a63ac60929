//! Transcription status state machine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::error::InvalidStatusError;

/// All statuses, in lifecycle order
pub const ALL_STATUSES: &[TranscriptionStatus] = &[
    TranscriptionStatus::Pending,
    TranscriptionStatus::Processing,
    TranscriptionStatus::Completed,
    TranscriptionStatus::Error,
];

/// Status of a transcription record and of the job driving it.
///
/// State machine:
///   PENDING -> PROCESSING (dispatch)
///   PROCESSING -> PROCESSING (progress echo)
///   PROCESSING -> COMPLETED (transcript stored)
///   PROCESSING -> ERROR (attempt failed)
///   PROCESSING -> PENDING (retry scheduled, record view)
///   ERROR -> PENDING (retry scheduled, job view)
///   PENDING -> ERROR (superseded before dispatch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

impl TranscriptionStatus {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Human-readable label
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Error => "Failed",
        }
    }

    /// Whether no further automatic transition follows this status.
    /// `Error` is terminal from the record's point of view; the queue may
    /// still re-enter `Pending` while a job has retry budget left.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Check whether moving to `next` is a legal transition
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Error)
                | (Self::Processing, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Error)
                | (Self::Processing, Self::Pending)
                | (Self::Error, Self::Pending)
        )
    }

    /// Transition to `next`, rejecting illegal moves
    pub fn transition(self, next: Self) -> Result<Self, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TranscriptionStatus {
    type Err = InvalidStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(InvalidStatusError {
                input: s.to_string(),
            }),
        }
    }
}

/// Error when an illegal status transition is attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status transition: cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: TranscriptionStatus,
    pub to: TranscriptionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use TranscriptionStatus::*;

    #[test]
    fn default_is_pending() {
        assert_eq!(TranscriptionStatus::default(), Pending);
    }

    #[test]
    fn forward_path_is_allowed() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
    }

    #[test]
    fn retry_reentry_is_allowed() {
        assert!(Error.can_transition_to(Pending));
        assert!(Processing.can_transition_to(Pending));
    }

    #[test]
    fn completed_is_final() {
        for next in ALL_STATUSES {
            assert!(!Completed.can_transition_to(*next), "completed -> {next}");
        }
    }

    #[test]
    fn error_cannot_jump_forward() {
        assert!(!Error.can_transition_to(Processing));
        assert!(!Error.can_transition_to(Completed));
    }

    #[test]
    fn pending_cannot_complete_directly() {
        let err = Pending.transition(Completed).unwrap_err();
        assert_eq!(err.from, Pending);
        assert_eq!(err.to, Completed);
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn terminal_states() {
        assert!(Completed.is_terminal());
        assert!(Error.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn parse_round_trip() {
        for status in ALL_STATUSES {
            assert_eq!(status.as_str().parse::<TranscriptionStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(" Completed ".parse::<TranscriptionStatus>().unwrap(), Completed);
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "done".parse::<TranscriptionStatus>().unwrap_err();
        assert!(err.to_string().contains("done"));
    }

    #[test]
    fn labels() {
        assert_eq!(Error.label(), "Failed");
        assert_eq!(Processing.to_string(), "processing");
    }
}
