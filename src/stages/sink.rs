//! # The stage contract and terminal sinks.
//!
//! Every pipeline stage is a [`Sink`]: it accepts one item and emits zero or
//! more items downstream. Terminal sinks end a chain:
//!
//! - [`SinkFn`] runs a closure per item (side effects, hand-off to other code)
//! - [`Collector`] appends items to an in-memory list
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use beanbus::{Bus, Collector};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), beanbus::BusError> {
//! let bus = Bus::<i32>::new("numbers");
//! let out = Arc::new(Collector::<i32>::new());
//! bus.set_to(out.clone());
//!
//! bus.start().await?;
//! bus.accept(1).await?;
//! bus.accept(2).await?;
//! bus.stop().await?;
//!
//! assert_eq!(out.items(), vec![1, 2]);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bus::Resettable;
use crate::error::BusError;
use crate::lock;

/// Accepts one item at a time.
///
/// Implementations forward, transform, buffer or discard the item. An error
/// returned here travels back up the chain to the bus, which crashes unless a
/// quarantine filter on the way recovers it.
#[async_trait]
pub trait Sink<T>: Send + Sync {
    /// Processes one item.
    async fn accept(&self, item: T) -> Result<(), BusError>;
}

/// Shared handle to a sink.
pub type SinkRef<T> = Arc<dyn Sink<T>>;

/// Closure-backed terminal sink.
pub struct SinkFn<F> {
    f: F,
}

impl<F> SinkFn<F> {
    /// Wraps `f`, called once per accepted item.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps `f` and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<T, F> Sink<T> for SinkFn<F>
where
    T: Send + 'static,
    F: Fn(T) -> Result<(), BusError> + Send + Sync,
{
    async fn accept(&self, item: T) -> Result<(), BusError> {
        (self.f)(item)
    }
}

/// Terminal sink collecting every item it accepts.
pub struct Collector<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Collector<T> {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Number of collected items.
    pub fn len(&self) -> usize {
        lock::lock(&self.items).len()
    }

    /// True if nothing was collected.
    pub fn is_empty(&self) -> bool {
        lock::lock(&self.items).is_empty()
    }

    /// Removes and returns everything collected so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *lock::lock(&self.items))
    }
}

impl<T: Clone> Collector<T> {
    /// Returns a copy of the collected items, in arrival order.
    pub fn items(&self) -> Vec<T> {
        lock::lock(&self.items).clone()
    }
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Collector<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        lock::lock(&self.items).push(item);
        Ok(())
    }
}

impl<T: Send + 'static> Resettable for Collector<T> {
    fn hard_reset(&self) {
        lock::lock(&self.items).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collector_keeps_arrival_order() {
        let out = Collector::<i32>::new();
        for i in 0..5 {
            out.accept(i).await.unwrap();
        }
        assert_eq!(out.items(), vec![0, 1, 2, 3, 4]);
        assert_eq!(out.take(), vec![0, 1, 2, 3, 4]);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn sink_fn_propagates_errors() {
        let sink = SinkFn::new(|s: &'static str| {
            if s == "bad" {
                Err(BusError::crash("boom"))
            } else {
                Ok(())
            }
        });
        assert!(sink.accept("good").await.is_ok());
        assert_eq!(sink.accept("bad").await, Err(BusError::crash("boom")));
    }
}
