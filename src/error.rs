//! Error types used by the bus, its stages and supervised jobs.
//!
//! This module defines two main error enums:
//!
//! - [`BusError`] errors raised while wiring, starting, feeding or stopping a bus.
//! - [`JobError`] errors raised by individual job executions.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging, and
//! a classification helper ([`BusError::is_recoverable`], [`JobError::is_failure`]).
//!
//! ## Failure categories
//! ```text
//! BusError::Config        → a required wiring element is missing (surfaced on first use)
//! BusError::BadBean       → one item cannot be processed (caught by the quarantine filter)
//! BusError::Crash         → anything else raised during a trip: crashes the whole bus
//! BusError::JobFailed     → a supervised job reached a failure state
//! ```

use thiserror::Error;

use crate::bus::BusPhase;

/// # Errors produced by a bus and its stages.
///
/// Cloneable so the same failure can be carried by a `crashed` event and
/// returned to the caller that triggered it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A required wiring element (sink, function, predicate, ...) was not set.
    #[error("configuration failure: {what}")]
    Config {
        /// Which element is missing or invalid.
        what: String,
    },

    /// A single item could not be processed; the bus may carry on.
    #[error("bad bean: {reason}")]
    BadBean {
        /// Why the item was rejected.
        reason: String,
    },

    /// Unhandled failure raised by a stage or a listener.
    #[error("bus crashed: {error}")]
    Crash {
        /// The underlying error message.
        error: String,
    },

    /// An operation was attempted in a phase that does not allow it.
    #[error("{op} is not allowed while the bus is {phase}")]
    IllegalState {
        /// The rejected operation.
        op: &'static str,
        /// The phase the bus was in.
        phase: BusPhase,
    },

    /// `stop` was called on a bus that was never started.
    #[error("bus has not been started")]
    NotStarted,

    /// A supervised job ended in a failure state.
    #[error("job {job} failed: {reason}")]
    JobFailed {
        /// Name of the job.
        job: String,
        /// Failure description reported by the job.
        reason: String,
    },
}

impl BusError {
    /// Shorthand for a [`BusError::Config`].
    pub fn config(what: impl Into<String>) -> Self {
        BusError::Config { what: what.into() }
    }

    /// Shorthand for a [`BusError::BadBean`].
    pub fn bad_bean(reason: impl Into<String>) -> Self {
        BusError::BadBean {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`BusError::Crash`].
    pub fn crash(error: impl Into<String>) -> Self {
        BusError::Crash {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use beanbus::BusError;
    ///
    /// let err = BusError::bad_bean("rotten");
    /// assert_eq!(err.as_label(), "bus_bad_bean");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::Config { .. } => "bus_config",
            BusError::BadBean { .. } => "bus_bad_bean",
            BusError::Crash { .. } => "bus_crash",
            BusError::IllegalState { .. } => "bus_illegal_state",
            BusError::NotStarted => "bus_not_started",
            BusError::JobFailed { .. } => "bus_job_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BusError::Config { what } => format!("config: {what}"),
            BusError::BadBean { reason } => format!("bad bean: {reason}"),
            BusError::Crash { error } => format!("crash: {error}"),
            BusError::IllegalState { op, phase } => format!("illegal: {op} in {phase}"),
            BusError::NotStarted => "not started".to_string(),
            BusError::JobFailed { job, reason } => format!("job {job}: {reason}"),
        }
    }

    /// Indicates whether the failure concerns a single item only.
    ///
    /// Only [`BusError::BadBean`] is recoverable; everything else crashes the bus.
    ///
    /// # Example
    /// ```
    /// use beanbus::BusError;
    ///
    /// assert!(BusError::bad_bean("rotten").is_recoverable());
    /// assert!(!BusError::crash("disk full").is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BusError::BadBean { .. })
    }
}

/// # Errors produced by job execution.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Job execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable fatal error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The job ran but did not achieve its goal.
    #[error("incomplete: {reason}")]
    Incomplete {
        /// Why the job considers itself incomplete.
        reason: String,
    },

    /// Job was cancelled through its context token.
    #[error("context cancelled")]
    Canceled,
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use beanbus::JobError;
    ///
    /// let err = JobError::Canceled;
    /// assert_eq!(err.as_label(), "job_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fail { .. } => "job_failed",
            JobError::Fatal { .. } => "job_fatal",
            JobError::Incomplete { .. } => "job_incomplete",
            JobError::Canceled => "job_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            JobError::Fail { error } => format!("error: {error}"),
            JobError::Fatal { error } => format!("fatal: {error}"),
            JobError::Incomplete { reason } => format!("incomplete: {reason}"),
            JobError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Indicates whether the job ended in an exception state.
    ///
    /// Returns `true` for [`JobError::Fail`] and [`JobError::Fatal`]; cancellation
    /// and incompleteness are normal terminal outcomes.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobError::Fail { .. } | JobError::Fatal { .. })
    }
}

impl From<BusError> for JobError {
    fn from(err: BusError) -> Self {
        JobError::Fail {
            error: err.to_string(),
        }
    }
}
