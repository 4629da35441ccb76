//! Session state machine.
//!
//! ```text
//! Created -> Configured -> Prepared -> Sampling <-> Paused -> EndedRun
//!                              ^                                  |
//!                              +----------- reset/prepare --------+
//! ```
//!
//! `Cancelled` is reachable from every state before `EndedRun`, and any
//! state can move to `Destroyed`.

use crate::error::{HostError, HostResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    /// A scene is attached.
    Configured,
    /// Buffers are allocated for a run.
    Prepared,
    Sampling,
    Paused,
    EndedRun,
    Cancelled,
    Destroyed,
}

impl SessionState {
    /// Whether a run is in progress.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Prepared | Self::Sampling | Self::Paused)
    }

    /// Whether `cancel` is accepted.
    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            Self::Created | Self::Configured | Self::Prepared | Self::Sampling | Self::Paused
        )
    }

    /// States [`wait`](super::Session::wait) returns on.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::EndedRun | Self::Cancelled | Self::Destroyed)
    }

    /// Fails with [`HostError::StatePrecondition`] unless `self` is one of
    /// `allowed`.
    pub fn require(self, operation: &'static str, allowed: &[SessionState]) -> HostResult<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(HostError::StatePrecondition {
                operation,
                state: self,
            })
        }
    }
}

/// Result of one [`sample`](super::Session::sample) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleStatus {
    /// More samples remain in the budget.
    Continue,
    /// The budget is reached.
    Done,
    Cancelled,
}

impl SampleStatus {
    /// Boundary value: 1 continue, 0 done, -1 cancelled.
    pub fn to_raw(self) -> i32 {
        match self {
            Self::Continue => 1,
            Self::Done => 0,
            Self::Cancelled => -1,
        }
    }
}
