//! # Quarantine: isolates items that fail downstream.
//!
//! [`BadBeanFilter`] forwards every item to its downstream chain. When the
//! chain reports a recoverable failure ([`BusError::BadBean`]) the item is
//! wrapped in a [`BadBeanTransfer`] and handed to the bad-bean handler instead
//! of crashing the bus. Any other failure travels on up to the bus.
//!
//! ```text
//! item ─► to.accept(item) ─► Ok ─────────────────────────────► Ok
//!                         └► Err(BadBean) ─► handler(transfer) ─► Ok
//!                         └► Err(other) ─────────────────────► Err(other)
//! ```
//!
//! ## Rules
//! - Without a handler, bad beans are dropped (logged once per run).
//! - The item is cloned before forwarding only when a handler is set.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bus::{BusEvent, BusListener, Resettable};
use crate::error::BusError;
use crate::stages::{Sink, SinkRef};

/// A quarantined item together with the failure it caused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BadBeanTransfer<T> {
    /// The item as it entered the quarantine filter.
    pub bean: T,
    /// The recoverable failure raised downstream.
    pub failure: BusError,
}

/// Diverts items that fail downstream with a recoverable error.
pub struct BadBeanFilter<T> {
    to: Option<SinkRef<T>>,
    handler: Option<SinkRef<BadBeanTransfer<T>>>,
    quarantined: AtomicU64,
    dropped_logged: AtomicBool,
}

impl<T> BadBeanFilter<T> {
    /// Creates an unwired filter.
    pub fn new() -> Self {
        Self {
            to: None,
            handler: None,
            quarantined: AtomicU64::new(0),
            dropped_logged: AtomicBool::new(false),
        }
    }

    /// Sets the downstream chain (builder form).
    pub fn with_to(mut self, to: SinkRef<T>) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the downstream chain.
    pub fn set_to(&mut self, to: Option<SinkRef<T>>) {
        self.to = to;
    }

    /// Returns the downstream chain.
    pub fn to(&self) -> Option<&SinkRef<T>> {
        self.to.as_ref()
    }

    /// Sets the bad-bean handler (builder form).
    pub fn with_handler(mut self, handler: SinkRef<BadBeanTransfer<T>>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets the bad-bean handler.
    pub fn set_handler(&mut self, handler: Option<SinkRef<BadBeanTransfer<T>>>) {
        self.handler = handler;
    }

    /// Returns the bad-bean handler.
    pub fn handler(&self) -> Option<&SinkRef<BadBeanTransfer<T>>> {
        self.handler.as_ref()
    }

    /// Items quarantined since the last reset.
    pub fn quarantined(&self) -> u64 {
        self.quarantined.load(Ordering::Relaxed)
    }

    fn reset_counts(&self) {
        self.quarantined.store(0, Ordering::Relaxed);
        self.dropped_logged.store(false, Ordering::Relaxed);
    }
}

impl<T> Default for BadBeanFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Sink<T> for BadBeanFilter<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let to = self
            .to
            .as_ref()
            .ok_or_else(|| BusError::config("bad bean filter has no destination"))?;

        let Some(handler) = &self.handler else {
            return match to.accept(item).await {
                Err(e) if e.is_recoverable() => {
                    self.quarantined.fetch_add(1, Ordering::Relaxed);
                    if !self.dropped_logged.swap(true, Ordering::Relaxed) {
                        info!(error = %e, "bad bean filter has no handler; bad beans are dropped");
                    }
                    Ok(())
                }
                other => other,
            };
        };

        let bean = item.clone();
        match to.accept(item).await {
            Err(failure) if failure.is_recoverable() => {
                self.quarantined.fetch_add(1, Ordering::Relaxed);
                debug!(error = %failure, "bean quarantined");
                handler.accept(BadBeanTransfer { bean, failure }).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> BusListener for BadBeanFilter<T> {
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.reset_counts();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "bad_bean_filter"
    }
}

impl<T: Send + 'static> Resettable for BadBeanFilter<T> {
    fn hard_reset(&self) {
        self.reset_counts();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::Bus;
    use crate::stages::{Collector, SinkFn, Transform};

    fn rot_check(s: &'static str) -> Result<&'static str, BusError> {
        if s.starts_with("Rotten") {
            Err(BusError::bad_bean(format!("{s} is rotten")))
        } else {
            Ok(s)
        }
    }

    #[tokio::test]
    async fn rotten_item_is_isolated_and_the_run_continues() {
        let bus = Bus::<&'static str>::new("quarantine");
        let good = Arc::new(Collector::<&'static str>::new());
        let bad = Arc::new(Collector::<BadBeanTransfer<&'static str>>::new());
        let check: Arc<Transform<&'static str, &'static str>> =
            Arc::new(Transform::try_map(rot_check).with_to(good.clone()));
        let quarantine = bus.attach(Arc::new(
            BadBeanFilter::<&'static str>::new()
                .with_to(check)
                .with_handler(bad.clone()),
        ));
        bus.set_to(quarantine.clone());
        bus.add_resettable(good.clone());
        bus.add_resettable(bad.clone());

        for _ in 0..2 {
            bus.start().await.unwrap();
            for s in ["Good", "Rotten", "Good"] {
                bus.accept(s).await.unwrap();
            }
            bus.stop().await.unwrap();

            assert_eq!(good.items(), vec!["Good", "Good"]);
            let bad_items = bad.items();
            assert_eq!(bad_items.len(), 1);
            assert_eq!(bad_items[0].bean, "Rotten");
            assert!(bad_items[0].failure.is_recoverable());
            assert_eq!(quarantine.quarantined(), 1);
            assert!(bus.failure().is_none());

            bus.hard_reset().unwrap();
            assert!(good.is_empty());
        }
    }

    #[tokio::test]
    async fn unrecoverable_failures_still_crash_the_bus() {
        let bus = Bus::<u32>::new("quarantine-crash");
        let broken: SinkRef<u32> =
            SinkFn::arc(|_n: u32| Err(BusError::crash("disk full")));
        let quarantine = bus.attach(Arc::new(BadBeanFilter::<u32>::new().with_to(broken)));
        bus.set_to(quarantine);

        bus.start().await.unwrap();
        let err = bus.accept(1).await.unwrap_err();
        assert_eq!(err, BusError::crash("disk full"));
        assert_eq!(bus.failure(), Some(BusError::crash("disk full")));
    }

    #[tokio::test]
    async fn bad_beans_without_handler_are_dropped() {
        let rejecting: SinkRef<u32> =
            SinkFn::arc(|n: u32| Err(BusError::bad_bean(format!("{n}"))));
        let quarantine = BadBeanFilter::<u32>::new().with_to(rejecting);

        assert!(quarantine.accept(1).await.is_ok());
        assert!(quarantine.accept(2).await.is_ok());
        assert_eq!(quarantine.quarantined(), 2);
    }
}
