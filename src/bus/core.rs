//! # Bus: the pipeline root.
//!
//! [`Bus`] owns the lifecycle phase, the head sink of the stage chain and the
//! listener list. Drivers call [`Bus::start`], [`Bus::accept`] repeatedly, then
//! [`Bus::stop`]; the bus brackets runs and trips with listener notifications
//! and turns any unhandled failure into a crash.
//!
//! ## Event flow
//! ```text
//! start()  ─► starting ─────────────────────────────────────► Running
//!                 └─ Err ─► crashed(Starting) ─► terminated ─► Stopped, Err returned
//!
//! accept() ─► [first item of a trip] trip-beginning
//!          ─► head.accept(item)
//!                 └─ Err ─► crashed(Running) ─► terminated ─► Stopped, Err returned
//!
//! stop()   ─► [tripping] trip-ending ─► stopping (all listeners) ─► terminated ─► Stopped
//! ```
//!
//! ## Rules
//! - `crashed` and `terminated` fire **exactly once** per run, however many
//!   stages re-raise the same failure on the way out.
//! - Phase and trip flag are only mutated inside `start`/`accept`/`stop`/`clean_bus`;
//!   callers serialize those. `request_bus_stop` may be called from anywhere.
//! - No lock is held while a listener or stage runs.

use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bus::listener::{ListenerSet, Notice};
use crate::bus::{BusConductor, BusEvent, BusListener, BusPhase, Resettable};
use crate::config::Config;
use crate::error::BusError;
use crate::lock;
use crate::stages::Sink;

/// Callback invoked by [`Bus::request_bus_stop`].
pub type StopCommand = Arc<dyn Fn() + Send + Sync>;

struct State {
    phase: BusPhase,
    tripping: bool,
    discard_logged: bool,
    failure: Option<BusError>,
}

/// Pipeline root owning the lifecycle state machine.
///
/// Always constructed behind an `Arc` so that events can refer back to it.
pub struct Bus<T> {
    name: Arc<str>,
    me: Weak<Bus<T>>,
    state: Mutex<State>,
    head: RwLock<Option<Arc<dyn Sink<T>>>>,
    listeners: ListenerSet,
    components: RwLock<Vec<Arc<dyn Resettable>>>,
    stop_command: RwLock<Option<StopCommand>>,
}

impl<T: Send + 'static> Bus<T> {
    /// Creates a bus in the `Ready` phase.
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|me| Self {
            name,
            me: me.clone(),
            state: Mutex::new(State {
                phase: BusPhase::Ready,
                tripping: false,
                discard_logged: false,
                failure: None,
            }),
            head: RwLock::new(None),
            listeners: ListenerSet::default(),
            components: RwLock::new(Vec::new()),
            stop_command: RwLock::new(None),
        })
    }

    /// Creates a bus named after `cfg.name`.
    pub fn with_config(cfg: &Config) -> Arc<Self> {
        Self::new(cfg.name.as_str())
    }

    /// Name of the bus.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current phase.
    pub fn phase(&self) -> BusPhase {
        lock::lock(&self.state).phase
    }

    /// True while a trip is in progress.
    pub fn is_tripping(&self) -> bool {
        lock::lock(&self.state).tripping
    }

    /// Failure that crashed the last run, if any. Cleared by [`Bus::hard_reset`].
    pub fn failure(&self) -> Option<BusError> {
        lock::lock(&self.state).failure.clone()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Sets the first stage of the pipeline.
    pub fn set_to(&self, to: Arc<dyn Sink<T>>) {
        *lock::write(&self.head) = Some(to);
    }

    /// Unsets the first stage; accepted items are then discarded.
    pub fn clear_to(&self) {
        *lock::write(&self.head) = None;
    }

    /// Returns the first stage of the pipeline.
    pub fn to(&self) -> Option<Arc<dyn Sink<T>>> {
        lock::read(&self.head).clone()
    }

    /// Sets the callback run by [`Bus::request_bus_stop`].
    pub fn set_stop_command(&self, command: Option<StopCommand>) {
        *lock::write(&self.stop_command) = command;
    }

    /// Registers a listener; dispatch order is registration order.
    pub fn add_bus_listener(&self, listener: Arc<dyn BusListener>) {
        self.listeners.add(listener);
    }

    /// Deregisters a listener (pointer identity). Returns `false` if unknown.
    pub fn remove_bus_listener(&self, listener: &Arc<dyn BusListener>) -> bool {
        self.listeners.remove(listener)
    }

    /// Registers a component whose reset hooks run on [`Bus::soft_reset`]/[`Bus::hard_reset`].
    pub fn add_resettable(&self, component: Arc<dyn Resettable>) {
        lock::write(&self.components).push(component);
    }

    /// Registers a stage both as listener and as resettable component.
    pub fn attach<S>(&self, stage: Arc<S>) -> Arc<S>
    where
        S: BusListener + Resettable,
    {
        self.listeners.add(stage.clone());
        self.add_resettable(stage.clone());
        stage
    }

    /// Starts the bus.
    ///
    /// ### Errors
    /// - [`BusError::IllegalState`] unless the bus is `Ready`
    /// - any failure raised by a `starting` listener (the bus crashes)
    pub async fn start(&self) -> Result<(), BusError> {
        {
            let mut st = lock::lock(&self.state);
            if st.phase != BusPhase::Ready {
                return Err(BusError::IllegalState {
                    op: "start",
                    phase: st.phase,
                });
            }
            st.phase = BusPhase::Starting;
            st.tripping = false;
            st.discard_logged = false;
        }

        let event = self.event(BusPhase::Starting);
        if let Err(e) = self.listeners.fire(Notice::Starting, &event).await {
            self.crash(BusPhase::Starting, &e).await;
            return Err(e);
        }

        lock::lock(&self.state).phase = BusPhase::Running;
        info!(bus = %self.name, listeners = self.listeners.len(), "bus started");
        Ok(())
    }

    /// Hands one item to the head of the pipeline, beginning a trip if needed.
    ///
    /// ### Errors
    /// - [`BusError::IllegalState`] unless the bus is `Running`
    /// - any failure raised by a `trip-beginning` listener or by the stages
    ///   (the bus crashes before the error is returned)
    pub async fn accept(&self, item: T) -> Result<(), BusError> {
        let begin_trip = {
            let mut st = lock::lock(&self.state);
            if st.phase != BusPhase::Running {
                return Err(BusError::IllegalState {
                    op: "accept",
                    phase: st.phase,
                });
            }
            !std::mem::replace(&mut st.tripping, true)
        };

        let head = self.to();
        if begin_trip {
            let event = self.event(BusPhase::Running);
            if let Err(e) = self.listeners.fire(Notice::TripBeginning, &event).await {
                self.crash(BusPhase::Running, &e).await;
                return Err(e);
            }
            if head.is_none() {
                self.log_discard_once();
            }
        }

        if let Some(head) = head {
            if let Err(e) = head.accept(item).await {
                self.crash(BusPhase::Running, &e).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Ends the current trip, if any, without stopping the bus.
    ///
    /// A failure raised by a `trip-ending` listener crashes the bus.
    pub async fn clean_bus(&self) -> Result<(), BusError> {
        let was_tripping = {
            let mut st = lock::lock(&self.state);
            st.phase == BusPhase::Running && std::mem::replace(&mut st.tripping, false)
        };
        if !was_tripping {
            return Ok(());
        }

        let event = self.event(BusPhase::Running);
        if let Err(e) = self.listeners.fire(Notice::TripEnding, &event).await {
            self.crash(BusPhase::Running, &e).await;
            return Err(e);
        }
        Ok(())
    }

    /// Stops the bus.
    ///
    /// Ends an in-progress trip, notifies every `stopping` listener and then
    /// fires `terminated` whatever happened. Stopping an already stopped or
    /// crashed bus does nothing.
    ///
    /// ### Errors
    /// - [`BusError::NotStarted`] if the bus was never started
    /// - a `trip-ending` failure (the bus crashes)
    /// - the last failure raised by a `stopping` listener
    pub async fn stop(&self) -> Result<(), BusError> {
        let was_tripping = {
            let mut st = lock::lock(&self.state);
            let phase = st.phase;
            match phase {
                BusPhase::Running => {
                    st.phase = BusPhase::Stopping;
                    std::mem::replace(&mut st.tripping, false)
                }
                BusPhase::Ready => return Err(BusError::NotStarted),
                BusPhase::Stopped | BusPhase::Crashed => {
                    debug!(bus = %self.name, phase = %phase, "stop ignored; bus already finished");
                    return Ok(());
                }
                _ => {
                    return Err(BusError::IllegalState { op: "stop", phase });
                }
            }
        };

        if was_tripping {
            let event = self.event(BusPhase::Stopping);
            if let Err(e) = self.listeners.fire(Notice::TripEnding, &event).await {
                self.crash(BusPhase::Stopping, &e).await;
                return Err(e);
            }
        }

        let event = self.event(BusPhase::Stopping);
        let outcome = self.listeners.fire_all(Notice::Stopping, &event).await;
        self.terminate().await;
        outcome
    }

    /// Records a stop request with every listener and runs the stop command.
    ///
    /// Does not change the phase; the driver owning the bus performs the stop.
    pub fn request_bus_stop(&self) {
        let phase = self.phase();
        info!(bus = %self.name, phase = %phase, "bus stop requested");

        let event = self.event(phase);
        self.listeners.fire_stop_requested(&event);

        let command = lock::read(&self.stop_command).clone();
        match command {
            Some(command) => command(),
            None => debug!(bus = %self.name, "no stop command configured"),
        }
    }

    /// Returns a finished bus to `Ready`, keeping component state.
    pub fn soft_reset(&self) -> Result<(), BusError> {
        self.reset_phase("soft_reset")?;
        let components = lock::read(&self.components).clone();
        for component in components {
            component.soft_reset();
        }
        debug!(bus = %self.name, "bus soft reset");
        Ok(())
    }

    /// Returns a finished bus to `Ready` and hard-resets every registered component.
    pub fn hard_reset(&self) -> Result<(), BusError> {
        self.reset_phase("hard_reset")?;
        lock::lock(&self.state).failure = None;
        let components = lock::read(&self.components).clone();
        for component in components {
            component.hard_reset();
        }
        debug!(bus = %self.name, "bus hard reset");
        Ok(())
    }

    fn reset_phase(&self, op: &'static str) -> Result<(), BusError> {
        let mut st = lock::lock(&self.state);
        let phase = st.phase;
        match phase {
            BusPhase::Ready | BusPhase::Stopped => {
                st.phase = BusPhase::Ready;
                st.tripping = false;
                Ok(())
            }
            _ => Err(BusError::IllegalState { op, phase }),
        }
    }

    fn event(&self, phase: BusPhase) -> BusEvent {
        let source: Weak<dyn BusConductor> = self.me.clone();
        BusEvent::new(source, self.name.clone(), phase)
    }

    fn log_discard_once(&self) {
        if self.listeners.any_requires_destination() {
            return;
        }
        let first = {
            let mut st = lock::lock(&self.state);
            !std::mem::replace(&mut st.discard_logged, true)
        };
        if first {
            info!(bus = %self.name, "bus has no destination; all items will be discarded");
        }
    }

    /// Reports `cause` once: `crashed` then forced termination.
    ///
    /// A failure re-raised after the bus already crashed fires nothing.
    async fn crash(&self, phase: BusPhase, cause: &BusError) {
        {
            let mut st = lock::lock(&self.state);
            if st.phase.is_finished() {
                return;
            }
            st.phase = BusPhase::Crashed;
            st.tripping = false;
            st.failure = Some(cause.clone());
        }
        warn!(bus = %self.name, phase = %phase, error = %cause, "bus crashed");

        let event = self.event(phase).with_cause(cause.clone());
        self.listeners.fire_best_effort(Notice::Crashed, &event).await;
        self.terminate().await;
    }

    async fn terminate(&self) {
        {
            let mut st = lock::lock(&self.state);
            st.phase = BusPhase::Stopped;
            st.tripping = false;
        }
        let event = self.event(BusPhase::Stopped);
        self.listeners
            .fire_best_effort(Notice::Terminated, &event)
            .await;
        info!(bus = %self.name, "bus terminated");
    }
}

#[async_trait]
impl<T: Send + 'static> BusConductor for Bus<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> BusPhase {
        Bus::phase(self)
    }

    fn add_bus_listener(&self, listener: Arc<dyn BusListener>) {
        Bus::add_bus_listener(self, listener);
    }

    fn remove_bus_listener(&self, listener: &Arc<dyn BusListener>) -> bool {
        Bus::remove_bus_listener(self, listener)
    }

    async fn clean_bus(&self) -> Result<(), BusError> {
        Bus::clean_bus(self).await
    }

    fn request_bus_stop(&self) {
        Bus::request_bus_stop(self);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::stages::{Batcher, Collector, SinkFn};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Arc<Self> {
            Self::failing(name, log, None)
        }

        fn failing(name: &'static str, log: &Log, fail_on: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: log.clone(),
                fail_on,
            })
        }

        fn note(&self, what: &'static str) -> Result<(), BusError> {
            lock::lock(&self.log).push(format!("{}:{what}", self.name));
            if self.fail_on == Some(what) {
                return Err(BusError::crash(format!("{} failed on {what}", self.name)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl BusListener for Recorder {
        async fn bus_starting(&self, _e: &BusEvent) -> Result<(), BusError> {
            self.note("starting")
        }
        async fn trip_beginning(&self, _e: &BusEvent) -> Result<(), BusError> {
            self.note("trip_beginning")
        }
        async fn trip_ending(&self, _e: &BusEvent) -> Result<(), BusError> {
            self.note("trip_ending")
        }
        async fn bus_stopping(&self, _e: &BusEvent) -> Result<(), BusError> {
            self.note("stopping")
        }
        fn bus_stop_requested(&self, _e: &BusEvent) {
            let _ = self.note("stop_requested");
        }
        async fn bus_crashed(&self, e: &BusEvent) -> Result<(), BusError> {
            assert!(e.cause.is_some());
            self.note("crashed")
        }
        async fn bus_terminated(&self, _e: &BusEvent) -> Result<(), BusError> {
            self.note("terminated")
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        lock::lock(log).clone()
    }

    #[tokio::test]
    async fn trips_are_bracketed_by_lifecycle_events() {
        let log = log();
        let bus = Bus::<u32>::new("trips");
        bus.add_bus_listener(Recorder::new("l", &log));
        let out = Arc::new(Collector::<u32>::new());
        bus.set_to(out.clone());

        bus.start().await.unwrap();
        bus.accept(1).await.unwrap();
        bus.accept(2).await.unwrap();
        bus.clean_bus().await.unwrap();
        bus.clean_bus().await.unwrap();
        bus.accept(3).await.unwrap();
        bus.stop().await.unwrap();

        assert_eq!(
            entries(&log),
            vec![
                "l:starting",
                "l:trip_beginning",
                "l:trip_ending",
                "l:trip_beginning",
                "l:trip_ending",
                "l:stopping",
                "l:terminated",
            ]
        );
        assert_eq!(out.items(), vec![1, 2, 3]);
        assert_eq!(bus.phase(), BusPhase::Stopped);
    }

    #[tokio::test]
    async fn stage_failure_crashes_once_and_is_returned() {
        let log = log();
        let bus = Bus::<u32>::new("crash");
        bus.add_bus_listener(Recorder::new("a", &log));
        bus.add_bus_listener(Recorder::new("b", &log));
        bus.set_to(SinkFn::arc(|_n: u32| Err(BusError::crash("boom"))));

        bus.start().await.unwrap();
        assert_eq!(bus.accept(1).await, Err(BusError::crash("boom")));

        let crashed: Vec<_> = entries(&log)
            .into_iter()
            .filter(|e| e.ends_with("crashed") || e.ends_with("terminated"))
            .collect();
        assert_eq!(crashed, vec!["a:crashed", "b:crashed", "a:terminated", "b:terminated"]);
        assert_eq!(bus.failure(), Some(BusError::crash("boom")));
        assert_eq!(bus.phase(), BusPhase::Stopped);

        assert!(matches!(
            bus.accept(2).await,
            Err(BusError::IllegalState { op: "accept", .. })
        ));
        assert_eq!(bus.stop().await, Ok(()));
    }

    #[tokio::test]
    async fn failure_raised_again_after_a_nested_crash_fires_nothing() {
        let log = log();
        let bus = Bus::<u32>::new("nested");
        bus.add_bus_listener(Recorder::failing("l", &log, Some("trip_ending")));
        let out = Arc::new(Collector::<Vec<u32>>::new());
        let batcher = bus.attach(Arc::new(
            Batcher::<u32>::new(2)
                .with_to(out.clone())
                .with_bus_conductor(&bus),
        ));
        bus.set_to(batcher);

        bus.start().await.unwrap();
        bus.accept(1).await.unwrap();
        let err = bus.accept(2).await.unwrap_err();

        assert_eq!(err, BusError::crash("l failed on trip_ending"));
        let log = entries(&log);
        assert_eq!(log.iter().filter(|e| *e == "l:crashed").count(), 1);
        assert_eq!(log.iter().filter(|e| *e == "l:terminated").count(), 1);
    }

    #[tokio::test]
    async fn stopping_reaches_every_listener_and_returns_the_last_failure() {
        let log = log();
        let bus = Bus::<u32>::new("stopping");
        bus.add_bus_listener(Recorder::failing("a", &log, Some("stopping")));
        bus.add_bus_listener(Recorder::failing("b", &log, Some("stopping")));
        bus.add_bus_listener(Recorder::new("c", &log));

        bus.start().await.unwrap();
        let err = bus.stop().await.unwrap_err();

        assert_eq!(err, BusError::crash("b failed on stopping"));
        let log = entries(&log);
        assert!(log.contains(&"c:stopping".to_string()));
        assert!(log.contains(&"c:terminated".to_string()));
        assert!(!log.iter().any(|e| e.ends_with("crashed")));
    }

    #[tokio::test]
    async fn starting_failure_crashes_before_running() {
        let log = log();
        let bus = Bus::<u32>::new("start-fail");
        bus.add_bus_listener(Recorder::failing("a", &log, Some("starting")));
        bus.add_bus_listener(Recorder::new("b", &log));

        let err = bus.start().await.unwrap_err();

        assert_eq!(err, BusError::crash("a failed on starting"));
        assert_eq!(
            entries(&log),
            vec!["a:starting", "a:crashed", "b:crashed", "a:terminated", "b:terminated"]
        );
        assert_eq!(bus.phase(), BusPhase::Stopped);
    }

    #[tokio::test]
    async fn operations_out_of_phase_are_rejected() {
        let bus = Bus::<u32>::new("phases");
        assert_eq!(bus.stop().await, Err(BusError::NotStarted));
        assert!(matches!(
            bus.accept(1).await,
            Err(BusError::IllegalState { phase: BusPhase::Ready, .. })
        ));

        bus.start().await.unwrap();
        assert!(bus.start().await.is_err());
        assert!(bus.soft_reset().is_err());
        bus.stop().await.unwrap();
        assert!(bus.start().await.is_err());

        bus.hard_reset().unwrap();
        bus.start().await.unwrap();
        bus.stop().await.unwrap();
    }

    struct Remover {
        bus: Weak<Bus<u32>>,
        victim: Mutex<Option<Arc<dyn BusListener>>>,
    }

    #[async_trait]
    impl BusListener for Remover {
        async fn trip_beginning(&self, _e: &BusEvent) -> Result<(), BusError> {
            let victim = lock::lock(&self.victim).take();
            if let (Some(bus), Some(victim)) = (self.bus.upgrade(), victim) {
                assert!(bus.remove_bus_listener(&victim));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn listener_removed_mid_dispatch_still_gets_the_event_in_flight() {
        let log = log();
        let bus = Bus::<u32>::new("removal");
        let victim: Arc<dyn BusListener> = Recorder::new("victim", &log);
        bus.add_bus_listener(Arc::new(Remover {
            bus: Arc::downgrade(&bus),
            victim: Mutex::new(Some(victim.clone())),
        }));
        bus.add_bus_listener(victim);

        bus.start().await.unwrap();
        bus.accept(1).await.unwrap();
        bus.stop().await.unwrap();

        assert_eq!(entries(&log), vec!["victim:starting", "victim:trip_beginning"]);
        assert_eq!(bus.listener_count(), 1);
    }

    #[tokio::test]
    async fn stop_request_notifies_listeners_and_runs_the_command() {
        let log = log();
        let bus = Bus::<u32>::new("request");
        bus.add_bus_listener(Recorder::new("l", &log));
        let log_for_command = log.clone();
        bus.set_stop_command(Some(Arc::new(move || {
            lock::lock(&log_for_command).push("command".to_string());
        })));

        bus.start().await.unwrap();
        bus.request_bus_stop();
        assert_eq!(bus.phase(), BusPhase::Running);
        bus.stop().await.unwrap();

        assert_eq!(
            entries(&log)[1..3].to_vec(),
            vec!["l:stop_requested".to_string(), "command".to_string()]
        );
    }

    #[tokio::test]
    async fn hard_reset_clears_failure_and_component_state() {
        let bus = Bus::<u32>::new("reset");
        let out = Arc::new(Collector::<u32>::new());
        bus.add_resettable(out.clone());
        bus.set_to(out.clone());

        bus.start().await.unwrap();
        bus.accept(5).await.unwrap();
        bus.stop().await.unwrap();

        bus.soft_reset().unwrap();
        assert_eq!(out.len(), 1);
        bus.hard_reset().unwrap();
        assert!(out.is_empty());
        assert!(bus.failure().is_none());
        assert_eq!(bus.phase(), BusPhase::Ready);
    }

    struct Tap {
        log: Log,
    }

    #[async_trait]
    impl BusListener for Tap {
        async fn trip_beginning(&self, _e: &BusEvent) -> Result<(), BusError> {
            lock::lock(&self.log).push("tap:trip_beginning".to_string());
            Ok(())
        }
        fn requires_destination(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn items_without_a_destination_are_discarded() {
        let bus = Bus::<u32>::new("headless");

        bus.start().await.unwrap();
        bus.accept(1).await.unwrap();
        bus.accept(2).await.unwrap();
        assert!(bus.to().is_none());
        assert!(lock::lock(&bus.state).discard_logged);

        bus.stop().await.unwrap();
        assert_eq!(bus.phase(), BusPhase::Stopped);
        assert!(bus.failure().is_none());
    }

    #[tokio::test]
    async fn listener_consuming_items_suppresses_the_discard_notice() {
        let log = log();
        let bus = Bus::<u32>::new("tapped");
        bus.add_bus_listener(Arc::new(Tap { log: log.clone() }));

        bus.start().await.unwrap();
        bus.accept(1).await.unwrap();
        bus.accept(2).await.unwrap();
        bus.stop().await.unwrap();

        assert!(!lock::lock(&bus.state).discard_logged);
        assert_eq!(entries(&log), vec!["tap:trip_beginning"]);
        assert_eq!(bus.phase(), BusPhase::Stopped);
    }
}
