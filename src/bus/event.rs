//! # Lifecycle notifications delivered to bus listeners.
//!
//! A [`BusEvent`] is created fresh for every notification and never mutated.
//! It names the bus, the phase the notification belongs to, and (for `crashed`)
//! the failure that brought the bus down.
//!
//! ## Ordering guarantees
//! Each event carries a globally unique sequence number (`seq`) that increases
//! monotonically across all buses in the process.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use crate::bus::{BusConductor, BusPhase};
use crate::error::BusError;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Immutable lifecycle notification.
#[derive(Clone, Debug)]
pub struct BusEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Name of the bus that raised the event.
    pub bus: Arc<str>,
    /// Phase the notification belongs to.
    pub phase: BusPhase,
    /// Failure that caused a crash, if any.
    pub cause: Option<BusError>,

    source: Weak<dyn BusConductor>,
}

impl BusEvent {
    pub(crate) fn new(source: Weak<dyn BusConductor>, bus: Arc<str>, phase: BusPhase) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            bus,
            phase,
            cause: None,
            source,
        }
    }

    /// Attaches the failure that caused this event.
    #[inline]
    pub(crate) fn with_cause(mut self, cause: BusError) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Returns the bus that raised the event, if it is still alive.
    ///
    /// Listeners may use it to add or remove listeners, or to request a stop.
    pub fn source(&self) -> Option<Arc<dyn BusConductor>> {
        self.source.upgrade()
    }
}
