//! Run lifecycle.
//!
//! # State Machine
//!
//! ```text
//! Idle ──> Enabling ──> Running ──> Completing ──┐
//!             │            │                     │
//!             │            ├──cancel──> Aborted ──┤──> SafetyShutdown
//!             │            │                     │
//!             └────────────┴──error───> Failed ───┘
//! ```
//!
//! Every terminal state is reached only after the safety shutdown has been
//! attempted on all channels the run touched.

use serde::Serialize;
use std::fmt;

/// Where an executor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Nothing running.
    Idle,
    /// Clearing protection, enabling outputs, waiting for relays.
    Enabling,
    /// Issuing profile points.
    Running,
    /// Profile finished; shutting outputs down.
    Completing,
    /// Stopped by a cancellation request.
    Aborted,
    /// Stopped by a device error.
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Enabling => write!(f, "Enabling"),
            RunState::Running => write!(f, "Running"),
            RunState::Completing => write!(f, "Completing"),
            RunState::Aborted => write!(f, "Aborted"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}

impl RunState {
    /// Check if the state is final for a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completing | RunState::Aborted | RunState::Failed
        )
    }

    /// Check if a transition to `next` is allowed.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Enabling)
                | (Enabling, Running)
                | (Enabling, Failed)
                | (Running, Completing)
                | (Running, Aborted)
                | (Running, Failed)
                | (Completing | Aborted | Failed, Idle)
        )
    }
}

/// How a run ended. Returned by both executors instead of an error, because a
/// run's failure is a normal, reportable result of asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every point was issued.
    Completed,
    /// Cancellation was requested before the profile finished.
    Aborted,
    /// A device call failed; carries the reason.
    Failed(String),
}

impl RunOutcome {
    /// True for [`RunOutcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    /// True for [`RunOutcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    /// Terminal state matching this outcome.
    pub fn terminal_state(&self) -> RunState {
        match self {
            RunOutcome::Completed => RunState::Completing,
            RunOutcome::Aborted => RunState::Aborted,
            RunOutcome::Failed(_) => RunState::Failed,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Aborted => write!(f, "aborted"),
            RunOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
