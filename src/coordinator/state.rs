//! Batch lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MailroomError, Result};

/// Where one attempt at a batch currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Events are being turned into hook arguments
    #[default]
    Translating,
    /// Pre-commit hooks are writing inside the open transaction
    PreCommitting,
    Committing,
    /// Transaction is durable; post-commit hooks are running
    PostCommitting,
    Done,
    /// Translation or a pre-commit hook failed; nothing was written
    Aborted,
    /// Commit failed; nothing was written and no post-commit hook ran
    Failed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Failed)
    }

    fn can_transition_to(&self, next: BatchState) -> bool {
        matches!(
            (self, next),
            (Self::Translating, Self::PreCommitting)
                | (Self::Translating, Self::Aborted)
                | (Self::PreCommitting, Self::Committing)
                | (Self::PreCommitting, Self::Aborted)
                | (Self::Committing, Self::PostCommitting)
                | (Self::Committing, Self::Failed)
                | (Self::PostCommitting, Self::Done)
        )
    }

    /// Move to `next`, rejecting transitions the lifecycle doesn't allow
    pub fn transition(self, next: BatchState) -> Result<BatchState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(MailroomError::Internal(format!(
                "invalid batch transition {self} -> {next}"
            )))
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Translating => write!(f, "translating"),
            Self::PreCommitting => write!(f, "pre_committing"),
            Self::Committing => write!(f, "committing"),
            Self::PostCommitting => write!(f, "post_committing"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = BatchState::Translating
            .transition(BatchState::PreCommitting)
            .and_then(|s| s.transition(BatchState::Committing))
            .and_then(|s| s.transition(BatchState::PostCommitting))
            .and_then(|s| s.transition(BatchState::Done))
            .unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_abort_only_before_commit() {
        assert!(BatchState::Translating.transition(BatchState::Aborted).is_ok());
        assert!(BatchState::PreCommitting.transition(BatchState::Aborted).is_ok());
        assert!(BatchState::Committing.transition(BatchState::Aborted).is_err());
        assert!(BatchState::PostCommitting.transition(BatchState::Aborted).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [BatchState::Done, BatchState::Aborted, BatchState::Failed] {
            assert!(terminal.is_terminal());
            assert!(terminal.transition(BatchState::Translating).is_err());
        }
        assert!(BatchState::Translating
            .transition(BatchState::Committing)
            .is_err());
    }
}
