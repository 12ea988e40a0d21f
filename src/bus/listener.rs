//! # Bus listener protocol.
//!
//! Provides [`BusListener`], the capability set notified around every start,
//! trip and stop of a bus, and the internal [`ListenerSet`] that dispatches to
//! registered listeners.
//!
//! ## Dispatch rules
//! ```text
//! starting / trip-beginning / trip-ending ─► snapshot, in order, first failure aborts
//! stopping                                ─► snapshot, in order, every listener visited,
//!                                            last failure returned
//! crashed / terminated                    ─► snapshot, in order, every listener visited,
//!                                            failures and panics logged and ignored
//! stop-requested                          ─► snapshot, in order, panics logged and ignored
//! ```
//!
//! Every dispatch iterates a copy of the listener list taken when the event
//! fires, so a listener may add or remove listeners (itself included) from
//! inside a callback without affecting the notification in flight.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use crate::bus::BusEvent;
use crate::error::BusError;
use crate::lock;

/// Listener for bus lifecycle notifications.
///
/// All callbacks default to doing nothing, so implementors only override the
/// ones they care about.
///
/// ### Failure semantics
/// - An error from `bus_starting` or `trip_beginning` crashes the bus.
/// - An error from `trip_ending` crashes the bus.
/// - An error from `bus_stopping` is returned by `stop` once every listener ran.
/// - Errors from `bus_crashed` / `bus_terminated` are logged and ignored.
#[async_trait]
pub trait BusListener: Send + Sync + 'static {
    /// The bus is about to run.
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    /// The first item of a new trip is about to be accepted.
    async fn trip_beginning(&self, _event: &BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    /// The current trip is ending (bus cleaned or stopping).
    async fn trip_ending(&self, _event: &BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    /// The bus is stopping normally.
    async fn bus_stopping(&self, _event: &BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    /// Someone asked the bus to stop. Called synchronously from the requester.
    fn bus_stop_requested(&self, _event: &BusEvent) {}

    /// The bus crashed; `event.cause` holds the failure.
    async fn bus_crashed(&self, _event: &BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    /// The bus is finished, after either a stop or a crash.
    async fn bus_terminated(&self, _event: &BusEvent) -> Result<(), BusError> {
        Ok(())
    }

    /// Returns the listener name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// True if this listener consumes items itself, so a bus without a head
    /// sink is not discarding them.
    fn requires_destination(&self) -> bool {
        false
    }
}

/// Callback selector used by [`ListenerSet`] dispatch.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Notice {
    Starting,
    TripBeginning,
    TripEnding,
    Stopping,
    Crashed,
    Terminated,
}

impl Notice {
    fn as_label(&self) -> &'static str {
        match self {
            Notice::Starting => "starting",
            Notice::TripBeginning => "trip_beginning",
            Notice::TripEnding => "trip_ending",
            Notice::Stopping => "stopping",
            Notice::Crashed => "crashed",
            Notice::Terminated => "terminated",
        }
    }

    async fn deliver(self, listener: &dyn BusListener, event: &BusEvent) -> Result<(), BusError> {
        match self {
            Notice::Starting => listener.bus_starting(event).await,
            Notice::TripBeginning => listener.trip_beginning(event).await,
            Notice::TripEnding => listener.trip_ending(event).await,
            Notice::Stopping => listener.bus_stopping(event).await,
            Notice::Crashed => listener.bus_crashed(event).await,
            Notice::Terminated => listener.bus_terminated(event).await,
        }
    }
}

/// Ordered listener registry with snapshot dispatch.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn BusListener>>>,
}

impl ListenerSet {
    pub(crate) fn add(&self, listener: Arc<dyn BusListener>) {
        lock::write(&self.listeners).push(listener);
    }

    /// Removes the first registration of `listener` (pointer identity).
    pub(crate) fn remove(&self, listener: &Arc<dyn BusListener>) -> bool {
        let mut listeners = lock::write(&self.listeners);
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(idx) => {
                listeners.remove(idx);
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn BusListener>> {
        lock::read(&self.listeners).clone()
    }

    pub(crate) fn len(&self) -> usize {
        lock::read(&self.listeners).len()
    }

    pub(crate) fn any_requires_destination(&self) -> bool {
        lock::read(&self.listeners)
            .iter()
            .any(|l| l.requires_destination())
    }

    /// Delivers in order; the first failure aborts the remaining listeners.
    pub(crate) async fn fire(&self, notice: Notice, event: &BusEvent) -> Result<(), BusError> {
        for listener in self.snapshot() {
            notice.deliver(listener.as_ref(), event).await?;
        }
        Ok(())
    }

    /// Delivers to every listener; returns the last failure observed.
    pub(crate) async fn fire_all(&self, notice: Notice, event: &BusEvent) -> Result<(), BusError> {
        let mut last = None;
        for listener in self.snapshot() {
            if let Err(e) = notice.deliver(listener.as_ref(), event).await {
                warn!(
                    bus = %event.bus,
                    listener = listener.name(),
                    notice = notice.as_label(),
                    error = %e,
                    "listener failed"
                );
                last = Some(e);
            }
        }
        match last {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delivers to every listener; failures and panics are logged and dropped.
    pub(crate) async fn fire_best_effort(&self, notice: Notice, event: &BusEvent) {
        for listener in self.snapshot() {
            let fut = notice.deliver(listener.as_ref(), event);
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    bus = %event.bus,
                    listener = listener.name(),
                    notice = notice.as_label(),
                    error = %e,
                    "listener failed; ignored"
                ),
                Err(_panic) => warn!(
                    bus = %event.bus,
                    listener = listener.name(),
                    notice = notice.as_label(),
                    "listener panicked; ignored"
                ),
            }
        }
    }

    /// Synchronous, non-failing delivery of `stop-requested`.
    pub(crate) fn fire_stop_requested(&self, event: &BusEvent) {
        for listener in self.snapshot() {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| listener.bus_stop_requested(event)));
            if outcome.is_err() {
                warn!(
                    bus = %event.bus,
                    listener = listener.name(),
                    "listener panicked on stop request; ignored"
                );
            }
        }
    }
}
