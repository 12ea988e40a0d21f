//! # Limiter: forwards the first `limit` items.
//!
//! [`Limiter`] counts accepted items. Items up to and including the limit are
//! forwarded; the item **at** the limit is the last one forwarded. What happens
//! next depends on [`LimitMode`]:
//!
//! ```text
//! limit = 2, items a b c
//!
//! StopBus: a ─► to   b ─► to ─► request_bus_stop()   c ─► dropped
//! Swallow: a ─► to   b ─► to                         c ─► dropped
//! ```
//!
//! A limit of `0` forwards nothing; in `StopBus` mode the first item then
//! triggers the stop request.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bus::{BusConductor, BusEvent, BusListener, Resettable};
use crate::error::BusError;
use crate::stages::{Sink, SinkRef};

/// What a [`Limiter`] does once its limit is reached.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitMode {
    /// Forward the item at the limit, then request a bus stop (once).
    #[default]
    StopBus,
    /// Keep the bus running and drop everything beyond the limit.
    Swallow,
}

/// Forwards at most `limit` items per run.
pub struct Limiter<T> {
    limit: u64,
    mode: LimitMode,
    to: Option<SinkRef<T>>,
    conductor: Option<Weak<dyn BusConductor>>,
    count: AtomicU64,
    dropped: AtomicU64,
    dropped_logged: AtomicBool,
}

impl<T> Limiter<T> {
    /// Creates a limiter in [`LimitMode::StopBus`] mode.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            mode: LimitMode::default(),
            to: None,
            conductor: None,
            count: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            dropped_logged: AtomicBool::new(false),
        }
    }

    /// Sets the downstream sink (builder form).
    pub fn with_to(mut self, to: SinkRef<T>) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the downstream sink.
    pub fn set_to(&mut self, to: Option<SinkRef<T>>) {
        self.to = to;
    }

    /// Returns the downstream sink.
    pub fn to(&self) -> Option<&SinkRef<T>> {
        self.to.as_ref()
    }

    /// Sets the behaviour at the limit (builder form).
    pub fn with_mode(mut self, mode: LimitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the behaviour at the limit.
    pub fn set_mode(&mut self, mode: LimitMode) {
        self.mode = mode;
    }

    /// Behaviour at the limit.
    pub fn mode(&self) -> LimitMode {
        self.mode
    }

    /// Maximum number of forwarded items.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Sets the maximum number of forwarded items.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Bus to ask for a stop once the limit is reached.
    pub fn set_bus_conductor<C: BusConductor>(&mut self, conductor: &Arc<C>) {
        let weak = Arc::downgrade(conductor);
        let weak: Weak<dyn BusConductor> = weak;
        self.conductor = Some(weak);
    }

    /// Builder form of [`Limiter::set_bus_conductor`].
    pub fn with_bus_conductor<C: BusConductor>(mut self, conductor: &Arc<C>) -> Self {
        self.set_bus_conductor(conductor);
        self
    }

    /// Items accepted since the last reset, forwarded or not.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Items dropped beyond the limit since the last reset.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn reset_counts(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.dropped_logged.store(false, Ordering::Relaxed);
    }

    fn request_stop(&self) {
        match self.conductor.as_ref().and_then(Weak::upgrade) {
            Some(conductor) => {
                info!(bus = conductor.name(), limit = self.limit, "limit reached; requesting bus stop");
                conductor.request_bus_stop();
            }
            None => warn!(limit = self.limit, "limit reached but no bus to stop"),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Limiter<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;

        if n > self.limit {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(count = n, limit = self.limit, "item beyond limit dropped");
            if self.limit == 0 && n == 1 && self.mode == LimitMode::StopBus {
                self.request_stop();
            }
            return Ok(());
        }

        match &self.to {
            Some(to) => to.accept(item).await?,
            None => {
                if !self.dropped_logged.swap(true, Ordering::Relaxed) {
                    info!("limiter has no destination; items are dropped");
                }
            }
        }

        if n == self.limit && self.mode == LimitMode::StopBus {
            self.request_stop();
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> BusListener for Limiter<T> {
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.reset_counts();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "limiter"
    }
}

impl<T: Send + 'static> Resettable for Limiter<T> {
    fn hard_reset(&self) {
        self.reset_counts();
    }
}
