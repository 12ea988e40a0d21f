//! Job states and state-change listeners.

use std::fmt;

use crate::error::JobError;
use crate::jobs::StatefulJob;

/// Where a [`StatefulJob`] is in its life cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet launched.
    Ready,
    /// Running.
    Executing,
    /// Finished successfully.
    Complete,
    /// Finished without reaching its goal (cancelled, or gave up cleanly).
    Incomplete,
    /// Failed; holds the failure message.
    Exception(String),
    /// Torn down; will not run again.
    Destroyed,
}

impl JobState {
    /// Maps the result of one execution to a terminal state.
    pub fn from_result(result: &Result<(), JobError>) -> Self {
        match result {
            Ok(()) => JobState::Complete,
            Err(e) if e.is_failure() => JobState::Exception(e.to_string()),
            Err(_) => JobState::Incomplete,
        }
    }

    /// True once the job stopped running for good or for this execution.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Ready | JobState::Executing)
    }

    /// True for `Exception` and `Destroyed`.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Exception(_) | JobState::Destroyed)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobState::Ready => "ready",
            JobState::Executing => "executing",
            JobState::Complete => "complete",
            JobState::Incomplete => "incomplete",
            JobState::Exception(_) => "exception",
            JobState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Exception(msg) => write!(f, "exception: {msg}"),
            other => f.write_str(other.as_label()),
        }
    }
}

/// Receives state changes of a [`StatefulJob`].
///
/// Called synchronously on the task performing the change; keep it short.
pub trait StateListener: Send + Sync + 'static {
    /// `job` moved to `state`.
    fn job_state_change(&self, job: &StatefulJob, state: &JobState);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_map_to_terminal_states() {
        assert_eq!(JobState::from_result(&Ok(())), JobState::Complete);
        assert_eq!(
            JobState::from_result(&Err(JobError::Canceled)),
            JobState::Incomplete
        );
        assert_eq!(
            JobState::from_result(&Err(JobError::Incomplete {
                reason: "no input".into()
            })),
            JobState::Incomplete
        );
        let failed = JobState::from_result(&Err(JobError::Fatal {
            error: "boom".into(),
        }));
        assert!(failed.is_failure());
        assert_eq!(failed.to_string(), "exception: fatal error: boom");
    }
}
