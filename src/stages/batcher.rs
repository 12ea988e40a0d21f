//! # Batcher: groups items into fixed-size batches.
//!
//! [`Batcher`] appends items to an accumulator. When it reaches `batch_size`
//! the whole batch is forwarded downstream as one `Vec<T>` and a fresh
//! accumulator is started. A partial batch is forwarded on [`Batcher::flush`],
//! at trip end and when the bus stops.
//!
//! ## Flow
//! ```text
//! accept(1) → [1]
//! accept(2) → [1, 2] ─► to.accept([1, 2]) ─► conductor.clean_bus()  (trip ends)
//! accept(3) → [3]
//! trip-ending / stopping / flush() ─► to.accept([3])
//! ```
//!
//! ## Rules
//! - A batch dispatched with no downstream sink is dropped and logged once.
//! - `batch_size == 0` is a configuration failure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bus::{BusConductor, BusEvent, BusListener, Resettable};
use crate::error::BusError;
use crate::lock;
use crate::stages::{Sink, SinkRef};

/// Accumulates items and forwards them in batches.
pub struct Batcher<T> {
    batch_size: usize,
    to: Option<SinkRef<Vec<T>>>,
    conductor: Option<Weak<dyn BusConductor>>,
    batch: Mutex<Vec<T>>,
    batches: AtomicU64,
    dropped_logged: AtomicBool,
}

impl<T> Batcher<T> {
    /// Creates a batcher forwarding every `batch_size` items.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            to: None,
            conductor: None,
            batch: Mutex::new(Vec::new()),
            batches: AtomicU64::new(0),
            dropped_logged: AtomicBool::new(false),
        }
    }

    /// Sets the downstream sink (builder form).
    pub fn with_to(mut self, to: SinkRef<Vec<T>>) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the downstream sink.
    pub fn set_to(&mut self, to: Option<SinkRef<Vec<T>>>) {
        self.to = to;
    }

    /// Returns the downstream sink.
    pub fn to(&self) -> Option<&SinkRef<Vec<T>>> {
        self.to.as_ref()
    }

    /// Threshold at which a batch is forwarded.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Sets the threshold at which a batch is forwarded.
    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    /// Lets the batcher end the current trip after each full batch.
    pub fn set_bus_conductor<C: BusConductor>(&mut self, conductor: &Arc<C>) {
        let weak = Arc::downgrade(conductor);
        let weak: Weak<dyn BusConductor> = weak;
        self.conductor = Some(weak);
    }

    /// Builder form of [`Batcher::set_bus_conductor`].
    pub fn with_bus_conductor<C: BusConductor>(mut self, conductor: &Arc<C>) -> Self {
        self.set_bus_conductor(conductor);
        self
    }

    /// Batches forwarded since the last reset.
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Number of items waiting in the current batch.
    pub fn pending(&self) -> usize {
        lock::lock(&self.batch).len()
    }

    fn clear(&self) {
        lock::lock(&self.batch).clear();
        self.batches.store(0, Ordering::Relaxed);
        self.dropped_logged.store(false, Ordering::Relaxed);
    }
}

impl<T: Send + 'static> Batcher<T> {
    /// Forwards the partial batch, if any.
    pub async fn flush(&self) -> Result<(), BusError> {
        let batch = std::mem::take(&mut *lock::lock(&self.batch));
        if batch.is_empty() {
            return Ok(());
        }
        self.dispatch(batch).await
    }

    async fn dispatch(&self, batch: Vec<T>) -> Result<(), BusError> {
        match &self.to {
            Some(to) => {
                debug!(size = batch.len(), "dispatching batch");
                to.accept(batch).await?;
                self.batches.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                if !self.dropped_logged.swap(true, Ordering::Relaxed) {
                    info!(size = batch.len(), "batcher has no destination; batches are dropped");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Batcher<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        if self.batch_size == 0 {
            return Err(BusError::config("batcher batch size must be at least 1"));
        }

        let full = {
            let mut batch = lock::lock(&self.batch);
            batch.push(item);
            if batch.len() >= self.batch_size {
                Some(std::mem::take(&mut *batch))
            } else {
                None
            }
        };

        if let Some(full) = full {
            self.dispatch(full).await?;
            if let Some(conductor) = self.conductor.as_ref().and_then(Weak::upgrade) {
                conductor.clean_bus().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> BusListener for Batcher<T> {
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.clear();
        Ok(())
    }

    async fn trip_ending(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.flush().await
    }

    async fn bus_stopping(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.flush().await
    }

    fn name(&self) -> &'static str {
        "batcher"
    }
}

impl<T: Send + 'static> Resettable for Batcher<T> {
    fn hard_reset(&self) {
        self.clear();
    }
}
