//! # Splitter: fan-out to several children.
//!
//! [`Splitter`] keeps an ordered list of child sinks and a [`SplitStrategy`]
//! that turns that list into a single routing sink. The route is resolved once
//! per run from the children registered at that moment:
//!
//! ```text
//! bus_starting ─► route = strategy.route(children)
//! accept(item) ─► route.accept(item)        (resolved lazily if no bus started us)
//! soft/hard reset ─► route cleared; next run resolves again
//! ```
//!
//! Adding or removing children during a run only affects the next run.
//!
//! Built-in strategies:
//! - [`Broadcast`]: every child receives every item (clones for all but the last)
//! - [`RoundRobin`]: each item goes to the next child in turn

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::bus::{BusEvent, BusListener, Resettable};
use crate::error::BusError;
use crate::lock;
use crate::stages::{Sink, SinkRef};

/// Builds the routing sink used by a [`Splitter`] for one run.
pub trait SplitStrategy<T>: Send + Sync {
    /// Returns a sink distributing items over `children` (in order).
    fn route(&self, children: Vec<SinkRef<T>>) -> SinkRef<T>;
}

/// Sends every item to every child, in child order.
#[derive(Clone, Copy, Debug, Default)]
pub struct Broadcast;

impl<T: Clone + Send + 'static> SplitStrategy<T> for Broadcast {
    fn route(&self, children: Vec<SinkRef<T>>) -> SinkRef<T> {
        Arc::new(BroadcastRoute { children })
    }
}

struct BroadcastRoute<T> {
    children: Vec<SinkRef<T>>,
}

#[async_trait]
impl<T: Clone + Send + 'static> Sink<T> for BroadcastRoute<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let Some((last, rest)) = self.children.split_last() else {
            return Ok(());
        };
        for child in rest {
            child.accept(item.clone()).await?;
        }
        last.accept(item).await
    }
}

/// Sends each item to one child, cycling through them in order.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobin;

impl<T: Send + 'static> SplitStrategy<T> for RoundRobin {
    fn route(&self, children: Vec<SinkRef<T>>) -> SinkRef<T> {
        Arc::new(RoundRobinRoute {
            children,
            next: AtomicUsize::new(0),
        })
    }
}

struct RoundRobinRoute<T> {
    children: Vec<SinkRef<T>>,
    next: AtomicUsize,
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for RoundRobinRoute<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        if self.children.is_empty() {
            return Ok(());
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.children.len();
        self.children[idx].accept(item).await
    }
}

/// Distributes items over child sinks according to a strategy.
pub struct Splitter<T> {
    children: RwLock<Vec<SinkRef<T>>>,
    strategy: Arc<dyn SplitStrategy<T>>,
    route: RwLock<Option<SinkRef<T>>>,
}

impl<T> Splitter<T> {
    /// Creates a splitter with no children.
    pub fn new<S>(strategy: S) -> Self
    where
        S: SplitStrategy<T> + 'static,
    {
        Self {
            children: RwLock::new(Vec::new()),
            strategy: Arc::new(strategy),
            route: RwLock::new(None),
        }
    }

    /// Appends a child (builder form).
    pub fn with_child(self, child: SinkRef<T>) -> Self {
        self.add_child(child);
        self
    }

    /// Appends a child; takes effect at the next run.
    pub fn add_child(&self, child: SinkRef<T>) {
        lock::write(&self.children).push(child);
    }

    /// Removes a child (pointer identity); takes effect at the next run.
    pub fn remove_child(&self, child: &SinkRef<T>) -> bool {
        let mut children = lock::write(&self.children);
        match children.iter().position(|c| Arc::ptr_eq(c, child)) {
            Some(idx) => {
                children.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Current children, in order.
    pub fn children(&self) -> Vec<SinkRef<T>> {
        lock::read(&self.children).clone()
    }

    /// Replaces the strategy; takes effect at the next run.
    pub fn set_strategy<S>(&mut self, strategy: S)
    where
        S: SplitStrategy<T> + 'static,
    {
        self.strategy = Arc::new(strategy);
    }

    /// The strategy in use.
    pub fn strategy(&self) -> &Arc<dyn SplitStrategy<T>> {
        &self.strategy
    }

    fn resolve(&self) -> SinkRef<T> {
        let route = self.strategy.route(self.children());
        *lock::write(&self.route) = Some(route.clone());
        route
    }

    fn clear_route(&self) {
        *lock::write(&self.route) = None;
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Splitter<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let route = lock::read(&self.route).clone();
        let route = match route {
            Some(route) => route,
            None => self.resolve(),
        };
        route.accept(item).await
    }
}

#[async_trait]
impl<T: Send + 'static> BusListener for Splitter<T> {
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.resolve();
        debug!(children = lock::read(&self.children).len(), "splitter route resolved");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "splitter"
    }
}

impl<T: Send + 'static> Resettable for Splitter<T> {
    fn soft_reset(&self) {
        self.clear_route();
    }

    fn hard_reset(&self) {
        self.clear_route();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::stages::Collector;

    #[tokio::test]
    async fn broadcast_reaches_every_child_in_order() {
        let a = Arc::new(Collector::<u32>::new());
        let b = Arc::new(Collector::<u32>::new());
        let split = Splitter::<u32>::new(Broadcast)
            .with_child(a.clone())
            .with_child(b.clone());

        split.accept(1).await.unwrap();
        split.accept(2).await.unwrap();

        assert_eq!(a.items(), vec![1, 2]);
        assert_eq!(b.items(), vec![1, 2]);
    }

    #[tokio::test]
    async fn round_robin_alternates_between_children() {
        let a = Arc::new(Collector::<u32>::new());
        let b = Arc::new(Collector::<u32>::new());
        let split = Splitter::<u32>::new(RoundRobin)
            .with_child(a.clone())
            .with_child(b.clone());

        for n in 1..=5 {
            split.accept(n).await.unwrap();
        }

        assert_eq!(a.items(), vec![1, 3, 5]);
        assert_eq!(b.items(), vec![2, 4]);
    }

    #[tokio::test]
    async fn children_added_mid_run_join_at_the_next_run() {
        let bus = Bus::<u32>::new("split");
        let a = Arc::new(Collector::<u32>::new());
        let late = Arc::new(Collector::<u32>::new());
        let split = bus.attach(Arc::new(
            Splitter::<u32>::new(Broadcast).with_child(a.clone()),
        ));
        bus.set_to(split.clone());

        bus.start().await.unwrap();
        bus.accept(1).await.unwrap();
        split.add_child(late.clone());
        bus.accept(2).await.unwrap();
        bus.stop().await.unwrap();
        assert_eq!(a.items(), vec![1, 2]);
        assert!(late.is_empty());

        bus.soft_reset().unwrap();
        bus.start().await.unwrap();
        bus.accept(3).await.unwrap();
        bus.stop().await.unwrap();
        assert_eq!(a.items(), vec![1, 2, 3]);
        assert_eq!(late.items(), vec![3]);
    }

    #[tokio::test]
    async fn empty_splitter_accepts_and_discards() {
        let split = Splitter::<u32>::new(RoundRobin);
        assert!(split.accept(7).await.is_ok());
    }
}
