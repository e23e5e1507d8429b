//! Submission state machine
//!
//! A step document is either editable (`Draft`) or turned in (`Submitted`).
//! Submitting freezes the document: section edits are rejected and the
//! progress value recorded at the moment of submission stays put until the
//! next submit. Withdrawing restores editability without touching progress.

use serde::{Deserialize, Serialize};
use stepdoc_common::{Error, Result};

/// Lifecycle state of a step document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionState {
    Draft,
    Submitted,
}

impl SubmissionState {
    pub fn from_flag(is_submitted: bool) -> Self {
        if is_submitted {
            SubmissionState::Submitted
        } else {
            SubmissionState::Draft
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionState::Submitted)
    }

    /// Section edits are only allowed on drafts
    pub fn can_edit(&self) -> bool {
        matches!(self, SubmissionState::Draft)
    }

    /// Draft → Submitted
    pub fn submit(self, step_number: i64) -> Result<Self> {
        match self {
            SubmissionState::Draft => Ok(SubmissionState::Submitted),
            SubmissionState::Submitted => Err(Error::Conflict(format!(
                "step {} is already submitted",
                step_number
            ))),
        }
    }

    /// Submitted → Draft
    pub fn withdraw(self, step_number: i64) -> Result<Self> {
        match self {
            SubmissionState::Submitted => Ok(SubmissionState::Draft),
            SubmissionState::Draft => Err(Error::Conflict(format!(
                "step {} is not submitted",
                step_number
            ))),
        }
    }
}

/// Explicit user acknowledgement for a submit/withdraw toggle
///
/// Both transitions are deliberate, confirmed actions; a request without
/// `confirm: true` never reaches persistence.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub confirm: bool,
}

impl Acknowledgement {
    pub fn ensure_confirmed(&self, operation: &str) -> Result<()> {
        if self.confirm {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "{} requires explicit confirmation",
                operation
            )))
        }
    }
}
