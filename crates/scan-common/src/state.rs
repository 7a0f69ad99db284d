//! Driver lifecycle states.
//!
//! The driver only knows two macro-states: STOPPED and RUNNING. Per-cycle
//! failures belong to the engine and never show up here.

use crate::error::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a scan driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverState {
    /// Timer destroyed or never created; engine not initialized.
    #[default]
    Stopped,
    /// Engine initialized and timer armed.
    Running,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Running => write!(f, "RUNNING"),
        }
    }
}

impl DriverState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: DriverState) -> bool {
        matches!(
            (self, target),
            (Self::Stopped, Self::Running) | (Self::Running, Self::Stopped)
        )
    }

    /// Attempt to transition to `target`, returning error if invalid.
    pub fn transition_to(&mut self, target: DriverState) -> ScanResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(ScanError::InvalidStateTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Returns true while the timer is armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}
