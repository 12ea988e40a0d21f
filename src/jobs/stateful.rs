//! # StatefulJob: a job with an observable state machine.
//!
//! [`StatefulJob`] runs a [`Job`] on the tokio runtime and reports every state
//! transition to its [`StateListener`]s.
//!
//! ## Rules
//! - A newly added listener is told the current state right away.
//! - Listeners are notified in registration order, over a copy of the list:
//!   a listener may deregister itself (or others) from inside a callback.
//! - A panic inside the job is reported as `Exception`; a panic inside a
//!   listener is logged and ignored.
//! - A destroyed job does not run again.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::jobs::{JobRef, JobState, StateListener};
use crate::lock;

/// Wraps a job with a state machine and state-change notifications.
pub struct StatefulJob {
    job: JobRef,
    state: Mutex<JobState>,
    listeners: RwLock<Vec<Arc<dyn StateListener>>>,
}

impl StatefulJob {
    /// Wraps `job` in the `Ready` state.
    pub fn new(job: JobRef) -> Arc<Self> {
        Arc::new(Self {
            job,
            state: Mutex::new(JobState::Ready),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Name of the wrapped job.
    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        lock::lock(&self.state).clone()
    }

    /// Registers a listener and notifies it of the current state.
    pub fn add_state_listener(&self, listener: Arc<dyn StateListener>) {
        lock::write(&self.listeners).push(Arc::clone(&listener));
        let current = self.state();
        self.deliver(&listener, &current);
    }

    /// Deregisters a listener (pointer identity). Returns `false` if unknown.
    pub fn remove_state_listener(&self, listener: &Arc<dyn StateListener>) -> bool {
        let mut listeners = lock::write(&self.listeners);
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(idx) => {
                listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock::read(&self.listeners).len()
    }

    /// Spawns one execution on the current runtime.
    pub fn launch(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<JobState> {
        let job = Arc::clone(self);
        tokio::spawn(async move { job.execute(token).await })
    }

    /// Runs the job once and returns the state it ended in.
    pub async fn execute(&self, token: CancellationToken) -> JobState {
        {
            let mut state = lock::lock(&self.state);
            if *state == JobState::Destroyed {
                debug!(job = self.name(), "destroyed job not executed");
                return JobState::Destroyed;
            }
            *state = JobState::Executing;
        }
        self.notify(&JobState::Executing);

        let child = token.child_token();
        let outcome = AssertUnwindSafe(self.job.run(child)).catch_unwind().await;
        let next = match outcome {
            Ok(result) => JobState::from_result(&result),
            Err(_panic) => JobState::Exception("job panicked".to_string()),
        };

        if !self.transition(next.clone()) {
            return JobState::Destroyed;
        }
        debug!(job = self.name(), state = %next, "job finished");
        next
    }

    /// Moves the job to `Destroyed`.
    pub fn destroy(&self) {
        self.transition(JobState::Destroyed);
    }

    /// Stores `next` and notifies; a destroyed job keeps its state.
    fn transition(&self, next: JobState) -> bool {
        {
            let mut state = lock::lock(&self.state);
            if *state == JobState::Destroyed {
                return false;
            }
            *state = next.clone();
        }
        self.notify(&next);
        true
    }

    fn notify(&self, state: &JobState) {
        let listeners = lock::read(&self.listeners).clone();
        for listener in &listeners {
            self.deliver(listener, state);
        }
    }

    fn deliver(&self, listener: &Arc<dyn StateListener>, state: &JobState) {
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| listener.job_state_change(self, state)));
        if outcome.is_err() {
            warn!(job = self.name(), state = %state, "state listener panicked; ignored");
        }
    }
}
