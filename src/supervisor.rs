//! # StatefulBusSupervisor: jobs in, one stop/crash decision out.
//!
//! Bridges [`StatefulJob`]s, which know nothing about buses, into the bus
//! stop/crash protocol.
//!
//! ```text
//! supervise(jobs) ─► Supervision::run()
//!                      ├─ job 1 ─► JobWatch ─┐
//!                      ├─ job 2 ─► JobWatch ─┼─► observe(state) ─► [decision mutex]
//!                      └─ job N ─► JobWatch ─┘        │
//!                                                     ├─ first Exception/Destroyed ─► crash(JobFailed)
//!                                                     └─ every job Complete/Incomplete ─► stop()
//! ```
//!
//! ## Rules
//! - Exactly one of `stop`/`crash` is delivered per supervision, from whichever
//!   task reported the deciding state change.
//! - Every registered watch is removed from its job exactly once, right after
//!   the decision; jobs reached after the decision get no watch at all.
//! - A supervision runs once; supervising no job at all stops right away.

use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::bus::BusConductor;
use crate::error::BusError;
use crate::jobs::{JobState, StateListener, StatefulJob};
use crate::lock;

type StopFn = Arc<dyn Fn() + Send + Sync>;
type CrashFn = Arc<dyn Fn(BusError) + Send + Sync>;

/// How a supervision ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Every job reached a successful or incomplete terminal state.
    Stopped,
    /// A job failed; holds the failure handed to the crash callback.
    Crashed(BusError),
}

/// Turns job state changes into bus-equivalent stop/crash actions.
#[derive(Clone)]
pub struct StatefulBusSupervisor {
    stop: StopFn,
    crash: CrashFn,
}

impl StatefulBusSupervisor {
    /// Creates a supervisor with explicit stop and crash actions.
    pub fn new<S, C>(stop: S, crash: C) -> Self
    where
        S: Fn() + Send + Sync + 'static,
        C: Fn(BusError) + Send + Sync + 'static,
    {
        Self {
            stop: Arc::new(stop),
            crash: Arc::new(crash),
        }
    }

    /// Creates a supervisor that asks `conductor` to stop in both cases.
    ///
    /// A crash is logged first; read [`Supervision::decision`] to tell the two
    /// apart.
    pub fn for_conductor(conductor: Weak<dyn BusConductor>) -> Self {
        let for_crash = conductor.clone();
        Self::new(
            move || {
                if let Some(c) = conductor.upgrade() {
                    c.request_bus_stop();
                }
            },
            move |cause| {
                if let Some(c) = for_crash.upgrade() {
                    warn!(bus = c.name(), error = %cause, "supervised job failed");
                    c.request_bus_stop();
                }
            },
        )
    }

    /// Prepares a single-use supervision over `jobs`.
    pub fn supervise(&self, jobs: Vec<Arc<StatefulJob>>) -> Arc<Supervision> {
        let count = jobs.len();
        Arc::new_cyclic(|me| Supervision {
            me: me.clone(),
            jobs,
            stop: Arc::clone(&self.stop),
            crash: Arc::clone(&self.crash),
            inner: Mutex::new(Inner {
                ran: false,
                decision: None,
                states: vec![None; count],
                watches: Vec::new(),
            }),
            decided: Notify::new(),
        })
    }
}

struct Inner {
    ran: bool,
    decision: Option<Decision>,
    states: Vec<Option<JobState>>,
    watches: Vec<(usize, Arc<dyn StateListener>)>,
}

/// Single-use action returned by [`StatefulBusSupervisor::supervise`].
pub struct Supervision {
    me: Weak<Supervision>,
    jobs: Vec<Arc<StatefulJob>>,
    stop: StopFn,
    crash: CrashFn,
    inner: Mutex<Inner>,
    decided: Notify,
}

struct JobWatch {
    supervision: Weak<Supervision>,
    index: usize,
}

impl StateListener for JobWatch {
    fn job_state_change(&self, _job: &StatefulJob, state: &JobState) {
        if let Some(supervision) = self.supervision.upgrade() {
            supervision.observe(self.index, state);
        }
    }
}

impl Supervision {
    /// Registers one watch per job.
    ///
    /// ### Errors
    /// [`BusError::Config`] if this supervision already ran.
    pub fn run(&self) -> Result<(), BusError> {
        {
            let mut inner = lock::lock(&self.inner);
            if inner.ran {
                return Err(BusError::config("supervision already ran"));
            }
            inner.ran = true;
        }

        if self.jobs.is_empty() {
            self.decide(Decision::Stopped, Vec::new());
            return Ok(());
        }

        for (index, job) in self.jobs.iter().enumerate() {
            let watch: Arc<dyn StateListener> = Arc::new(JobWatch {
                supervision: self.me.clone(),
                index,
            });
            {
                let mut inner = lock::lock(&self.inner);
                if inner.decision.is_some() {
                    break;
                }
                inner.watches.push((index, Arc::clone(&watch)));
            }

            // may report the current state synchronously, and even decide
            job.add_state_listener(Arc::clone(&watch));

            // the decision may have been taken before the watch was attached
            if lock::lock(&self.inner).decision.is_some() {
                job.remove_state_listener(&watch);
            }
        }
        Ok(())
    }

    /// The decision, once taken.
    pub fn decision(&self) -> Option<Decision> {
        lock::lock(&self.inner).decision.clone()
    }

    /// Waits for the decision.
    pub async fn finished(&self) -> Decision {
        loop {
            let notified = self.decided.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(decision) = self.decision() {
                return decision;
            }
            notified.await;
        }
    }

    /// Supervised jobs, in order.
    pub fn jobs(&self) -> &[Arc<StatefulJob>] {
        &self.jobs
    }

    fn observe(&self, index: usize, state: &JobState) {
        let (decision, watches) = {
            let mut inner = lock::lock(&self.inner);
            if inner.decision.is_some() {
                return;
            }
            inner.states[index] = Some(state.clone());

            let decision = if state.is_failure() {
                let job = self.jobs[index].name().to_string();
                Decision::Crashed(BusError::JobFailed {
                    job,
                    reason: state.to_string(),
                })
            } else if inner
                .states
                .iter()
                .all(|s| s.as_ref().is_some_and(JobState::is_terminal))
            {
                Decision::Stopped
            } else {
                return;
            };
            inner.decision = Some(decision.clone());
            (decision, std::mem::take(&mut inner.watches))
        };
        self.decide(decision, watches);
    }

    /// Runs outside the lock: deregisters, then delivers.
    fn decide(&self, decision: Decision, watches: Vec<(usize, Arc<dyn StateListener>)>) {
        {
            let mut inner = lock::lock(&self.inner);
            inner.decision.get_or_insert_with(|| decision.clone());
        }
        for (index, watch) in &watches {
            self.jobs[*index].remove_state_listener(watch);
        }
        debug!(watches = watches.len(), "supervision watches removed");

        match &decision {
            Decision::Stopped => {
                info!(jobs = self.jobs.len(), "supervised jobs finished; stopping");
                (self.stop)();
            }
            Decision::Crashed(cause) => {
                warn!(error = %cause, "supervised job failed; crashing");
                (self.crash)(cause.clone());
            }
        }
        self.decided.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::JobError;
    use crate::jobs::JobFn;

    #[derive(Default)]
    struct Calls {
        stops: AtomicUsize,
        crashes: Mutex<Vec<BusError>>,
    }

    fn counting(calls: &Arc<Calls>) -> StatefulBusSupervisor {
        let (a, b) = (calls.clone(), calls.clone());
        StatefulBusSupervisor::new(
            move || {
                a.stops.fetch_add(1, Ordering::SeqCst);
            },
            move |cause| lock::lock(&b.crashes).push(cause),
        )
    }

    fn job(name: &'static str, result: Result<(), JobError>) -> Arc<StatefulJob> {
        StatefulJob::new(JobFn::arc(name, move |_ctx: CancellationToken| {
            let result = result.clone();
            async move { result }
        }))
    }

    #[tokio::test]
    async fn all_jobs_finishing_stops_once() {
        let calls = Arc::new(Calls::default());
        let jobs = vec![job("a", Ok(())), job("b", Err(JobError::Canceled))];
        let supervision = counting(&calls).supervise(jobs.clone());
        supervision.run().unwrap();

        for j in &jobs {
            j.execute(CancellationToken::new()).await;
        }

        assert_eq!(supervision.finished().await, Decision::Stopped);
        assert_eq!(calls.stops.load(Ordering::SeqCst), 1);
        assert!(lock::lock(&calls.crashes).is_empty());
        assert!(jobs.iter().all(|j| j.listener_count() == 0));
    }

    #[tokio::test]
    async fn first_failure_crashes_and_detaches_every_watch() {
        let calls = Arc::new(Calls::default());
        let jobs = vec![
            job("slow", Ok(())),
            job("broken", Err(JobError::Fatal { error: "disk".into() })),
        ];
        let supervision = counting(&calls).supervise(jobs.clone());
        supervision.run().unwrap();

        jobs[1].execute(CancellationToken::new()).await;
        assert!(jobs.iter().all(|j| j.listener_count() == 0));
        jobs[0].execute(CancellationToken::new()).await;

        let crashes = lock::lock(&calls.crashes).clone();
        assert_eq!(crashes.len(), 1);
        assert!(matches!(&crashes[0], BusError::JobFailed { job, .. } if job == "broken"));
        assert_eq!(calls.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn already_finished_jobs_decide_during_run() {
        let calls = Arc::new(Calls::default());
        let failed = job("early", Ok(()));
        failed.destroy();
        let pending = job("late", Ok(()));

        let supervision = counting(&calls).supervise(vec![failed.clone(), pending.clone()]);
        supervision.run().unwrap();

        assert!(matches!(supervision.decision(), Some(Decision::Crashed(_))));
        assert_eq!(failed.listener_count(), 0);
        assert_eq!(pending.listener_count(), 0);
        assert!(supervision.run().is_err());
    }

    #[tokio::test]
    async fn empty_supervision_stops_immediately() {
        let calls = Arc::new(Calls::default());
        counting(&calls).supervise(Vec::new()).run().unwrap();
        assert_eq!(calls.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_deliver_exactly_one_stop() {
        for _ in 0..200 {
            let calls = Arc::new(Calls::default());
            let jobs = vec![job("left", Ok(())), job("right", Ok(()))];
            let supervision = counting(&calls).supervise(jobs.clone());
            supervision.run().unwrap();

            let token = CancellationToken::new();
            let handles: Vec<_> = jobs.iter().map(|j| j.launch(token.clone())).collect();
            for h in handles {
                h.await.unwrap();
            }

            assert_eq!(supervision.finished().await, Decision::Stopped);
            assert_eq!(calls.stops.load(Ordering::SeqCst), 1);
            assert!(lock::lock(&calls.crashes).is_empty());
            assert!(jobs.iter().all(|j| j.listener_count() == 0));
        }
    }
}
