//! # Filter: predicate gate.
//!
//! [`Filter`] forwards an item unchanged when its predicate holds and silently
//! drops it otherwise. Both outcomes are counted; counters reset when the bus
//! starts and on hard reset.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::bus::{BusEvent, BusListener, Resettable};
use crate::error::BusError;
use crate::stages::{Sink, SinkRef};

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Forwards only the items matching a predicate.
pub struct Filter<T> {
    predicate: Option<Predicate<T>>,
    to: Option<SinkRef<T>>,
    passed: AtomicU64,
    blocked: AtomicU64,
}

impl<T> Filter<T> {
    /// Creates a filter with the given predicate.
    pub fn new<P>(predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
            to: None,
            passed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
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

    /// Replaces the predicate.
    pub fn set_predicate<P>(&mut self, predicate: P)
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
    }

    /// Items forwarded since the last reset.
    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    /// Items dropped since the last reset.
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    fn reset_counts(&self) {
        self.passed.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Filter<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let predicate = self
            .predicate
            .as_ref()
            .ok_or_else(|| BusError::config("filter has no predicate"))?;

        if !predicate(&item) {
            self.blocked.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let to = self
            .to
            .as_ref()
            .ok_or_else(|| BusError::config("filter has no destination"))?;
        to.accept(item).await?;
        self.passed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> BusListener for Filter<T> {
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.reset_counts();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "filter"
    }
}

impl<T: Send + 'static> Resettable for Filter<T> {
    fn hard_reset(&self) {
        self.reset_counts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::stages::Collector;

    #[tokio::test]
    async fn drops_items_failing_the_predicate() {
        let out = Arc::new(Collector::<u32>::new());
        let even = Filter::new(|n: &u32| n % 2 == 0).with_to(out.clone());

        for n in 1..=6 {
            even.accept(n).await.unwrap();
        }

        assert_eq!(out.items(), vec![2, 4, 6]);
        assert_eq!(even.passed(), 3);
        assert_eq!(even.blocked(), 3);
    }

    #[tokio::test]
    async fn counters_reset_when_the_bus_starts_again() {
        let bus = Bus::<&'static str>::new("filter-test");
        let out = Arc::new(Collector::<&'static str>::new());
        let short = bus.attach(Arc::new(
            Filter::new(|s: &&str| s.len() < 5).with_to(out.clone()),
        ));
        bus.set_to(short.clone());

        for round in 0..2 {
            bus.start().await.unwrap();
            for s in ["fig", "banana", "kiwi"] {
                bus.accept(s).await.unwrap();
            }
            bus.stop().await.unwrap();

            assert_eq!(short.passed(), 2, "round {round}");
            assert_eq!(short.blocked(), 1, "round {round}");
            bus.soft_reset().unwrap();
        }
    }

    #[tokio::test]
    async fn missing_destination_is_reported_for_passing_items_only() {
        let f: Filter<u8> = Filter::new(|n| *n > 10);
        assert!(f.accept(1).await.is_ok());
        assert_eq!(f.accept(11).await.unwrap_err().as_label(), "bus_config");
    }
}
