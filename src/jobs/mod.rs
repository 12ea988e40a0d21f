//! # Jobs with an observable state machine.
//!
//! - [`Job`] - trait for async, cancelable units of work
//! - [`JobFn`] - closure-backed job
//! - [`JobRef`] - shared handle (`Arc<dyn Job>`)
//! - [`StatefulJob`] - runs a job and publishes its [`JobState`] changes to
//!   [`StateListener`]s
//!
//! ## State machine
//! ```text
//! Ready ──► Executing ──► Complete      (Ok)
//!                     ├─► Incomplete    (JobError::Canceled / Incomplete)
//!                     └─► Exception(..) (JobError::Fail / Fatal, or a panic)
//! any ──► Destroyed (destroy())
//! ```

mod job;
mod state;
mod stateful;

pub use job::{Job, JobFn, JobRef};
pub use state::{JobState, StateListener};
pub use stateful::StatefulJob;
