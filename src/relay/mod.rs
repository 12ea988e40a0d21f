//! # Relay: bounded hand-off between a bus and its consumers.
//!
//! A [`Relay`] is a FIFO buffer sitting at the end of a pipeline. Producers
//! (usually the bus, through the [`Sink`](crate::Sink) impl) put items in;
//! any number of consumer tasks pull them out through [`RelayConsumer`]s.
//!
//! ## Architecture
//! ```text
//! bus ─► Relay::accept ─► [ item item item STOP ] ─► consumer 1 ─► next()
//!           (waits while full)                    ├► consumer 2 ─► next()
//!                                                 └► consumer N ─► next()
//! ```
//!
//! ## Rules
//! - `put` waits while the relay holds `capacity` items; it never drops an item
//!   unless the producer's cancellation token fires while it waits.
//! - `stop` enqueues a single stop marker, ignoring capacity. A consumer that
//!   reaches the marker puts it back and ends; every other consumer then sees
//!   the same marker, so one stop ends all of them.
//! - Items enqueued before the stop are still delivered.
//! - Cancelling a consumer's token ends that consumer only.

mod consumer;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{BusEvent, BusListener, Resettable};
use crate::config::Config;
use crate::error::BusError;
use crate::lock;
use crate::stages::Sink;

pub use consumer::RelayConsumer;

enum Slot<T> {
    Item(T),
    Stop,
}

/// Outcome of a non-waiting take.
pub(crate) enum Take<T> {
    Item(T),
    Stopped,
    Empty,
}

struct Inner<T> {
    queue: VecDeque<Slot<T>>,
    items: usize,
}

/// Multi-consumer FIFO relay with cooperative shutdown.
pub struct Relay<T> {
    inner: Mutex<Inner<T>>,
    capacity: Option<usize>,
    readable: Notify,
    writable: Notify,
    taken: AtomicU64,
    waiting: AtomicUsize,
    producers: Mutex<CancellationToken>,
}

impl<T> Relay<T> {
    /// Creates a relay holding at most `capacity` items; `0` means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                items: 0,
            }),
            capacity: (capacity > 0).then_some(capacity),
            readable: Notify::new(),
            writable: Notify::new(),
            taken: AtomicU64::new(0),
            waiting: AtomicUsize::new(0),
            producers: Mutex::new(CancellationToken::new()),
        }
    }

    /// Creates a relay sized by [`Config::relay_capacity`].
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.relay_limit().unwrap_or(0))
    }

    /// Maximum number of buffered items; `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Puts an item, waiting while the relay is full.
    ///
    /// Returns `false` if `token` was cancelled before room became available;
    /// the item is then abandoned.
    pub async fn put(&self, item: T, token: &CancellationToken) -> bool {
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = lock::lock(&self.inner);
                if self.capacity.is_none_or(|cap| inner.items < cap) {
                    inner.queue.push_back(Slot::Item(item));
                    inner.items += 1;
                    drop(inner);
                    self.readable.notify_one();
                    return true;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = token.cancelled() => {
                    debug!("relay put interrupted; item abandoned");
                    return false;
                }
            }
        }
    }

    /// Enqueues the stop marker; every consumer ends after draining the items
    /// ahead of it.
    pub fn stop(&self) {
        lock::lock(&self.inner).queue.push_back(Slot::Stop);
        self.readable.notify_waiters();
        debug!("relay stop enqueued");
    }

    /// True once a stop marker is buffered.
    pub fn is_stopped(&self) -> bool {
        lock::lock(&self.inner)
            .queue
            .iter()
            .any(|slot| matches!(slot, Slot::Stop))
    }

    /// Clears the buffer and the taken counter and re-arms producers.
    ///
    /// Consumers should not be waiting; a warning is logged if some are.
    pub fn reset(&self) {
        let waiting = self.waiting_consumers();
        if waiting > 0 {
            warn!(waiting, "relay reset while consumers are waiting");
        }
        self.clear();
    }

    /// Items handed to consumers since the last reset.
    pub fn taken(&self) -> u64 {
        self.taken.load(Ordering::Relaxed)
    }

    /// Buffered items, not counting the stop marker.
    pub fn len(&self) -> usize {
        lock::lock(&self.inner).items
    }

    /// True if no item is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumers currently waiting for an item.
    pub fn waiting_consumers(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Token used by the [`Sink`] impl while waiting for room.
    pub fn producer_token(&self) -> CancellationToken {
        lock::lock(&self.producers).clone()
    }

    /// Interrupts producers waiting in [`Sink::accept`]; their items are abandoned.
    pub fn interrupt_producers(&self) {
        lock::lock(&self.producers).cancel();
    }

    /// Returns a pull-sequence over this relay that ends on stop or when
    /// `token` is cancelled.
    pub fn consumer(self: &Arc<Self>, token: CancellationToken) -> RelayConsumer<T> {
        RelayConsumer::new(Arc::clone(self), token)
    }

    pub(crate) fn try_take(&self) -> Take<T> {
        let mut inner = lock::lock(&self.inner);
        match inner.queue.pop_front() {
            Some(Slot::Item(item)) => {
                inner.items -= 1;
                drop(inner);
                self.taken.fetch_add(1, Ordering::Relaxed);
                self.writable.notify_one();
                Take::Item(item)
            }
            Some(Slot::Stop) => {
                inner.queue.push_front(Slot::Stop);
                Take::Stopped
            }
            None => Take::Empty,
        }
    }

    pub(crate) fn readable(&self) -> &Notify {
        &self.readable
    }

    pub(crate) fn waiting_counter(&self) -> &AtomicUsize {
        &self.waiting
    }

    fn clear(&self) {
        {
            let mut inner = lock::lock(&self.inner);
            inner.queue.clear();
            inner.items = 0;
        }
        self.taken.store(0, Ordering::Relaxed);
        *lock::lock(&self.producers) = CancellationToken::new();
        self.writable.notify_waiters();
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Relay<T> {
    async fn accept(&self, item: T) -> Result<(), BusError> {
        let token = self.producer_token();
        self.put(item, &token).await;
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> BusListener for Relay<T> {
    async fn bus_starting(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.clear();
        Ok(())
    }

    async fn bus_terminated(&self, _event: &BusEvent) -> Result<(), BusError> {
        self.stop();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "relay"
    }
}

impl<T: Send + 'static> Resettable for Relay<T> {
    fn hard_reset(&self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::Bus;

    #[tokio::test]
    async fn items_come_out_in_order_then_the_sequence_ends() {
        let relay = Arc::new(Relay::<u32>::new(0));
        let token = CancellationToken::new();
        for n in 1..=3 {
            assert!(relay.put(n, &token).await);
        }
        relay.stop();

        let mut consumer = relay.consumer(CancellationToken::new());
        let mut got = Vec::new();
        while let Some(n) = consumer.next().await {
            got.push(n);
        }
        assert_eq!(got, vec![1, 2, 3]);
        assert_eq!(relay.taken(), 3);
        assert!(relay.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_stop_ends_every_waiting_consumer() {
        let relay = Arc::new(Relay::<u32>::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let mut consumer = relay.consumer(CancellationToken::new());
            handles.push(tokio::spawn(async move {
                let mut n = 0;
                while consumer.next().await.is_some() {
                    n += 1;
                }
                n
            }));
        }

        while relay.waiting_consumers() < 4 {
            tokio::task::yield_now().await;
        }
        let token = CancellationToken::new();
        for n in 0..10 {
            relay.put(n, &token).await;
        }
        relay.stop();

        let mut total = 0;
        for h in handles {
            total += tokio::time::timeout(Duration::from_secs(5), h)
                .await
                .expect("consumer did not end")
                .unwrap();
        }
        assert_eq!(total, 10);
        assert_eq!(relay.waiting_consumers(), 0);
    }

    #[tokio::test]
    async fn full_relay_blocks_the_producer_until_an_item_is_taken() {
        let relay = Arc::new(Relay::<&'static str>::new(1));
        let token = CancellationToken::new();
        assert!(relay.put("a", &token).await);

        let producer = {
            let relay = relay.clone();
            let token = token.clone();
            tokio::spawn(async move { relay.put("b", &token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(relay.len(), 1);

        let mut consumer = relay.consumer(CancellationToken::new());
        assert_eq!(consumer.next().await, Some("a"));
        assert!(producer.await.unwrap());
        assert_eq!(consumer.next().await, Some("b"));
    }

    #[tokio::test]
    async fn cancelled_producer_abandons_its_item() {
        let relay = Relay::<u32>::new(1);
        let token = CancellationToken::new();
        assert!(relay.put(1, &token).await);

        token.cancel();
        assert!(!relay.put(2, &token).await);
        assert_eq!(relay.len(), 1);
    }

    #[tokio::test]
    async fn cancelling_one_consumer_leaves_the_others_running() {
        let relay = Arc::new(Relay::<u32>::new(0));
        let cancelled = CancellationToken::new();
        let mut first = relay.consumer(cancelled.clone());
        let mut second = relay.consumer(CancellationToken::new());

        let waiting = tokio::spawn(async move { first.next().await });
        while relay.waiting_consumers() < 1 {
            tokio::task::yield_now().await;
        }
        cancelled.cancel();
        assert_eq!(waiting.await.unwrap(), None);

        relay.put(7, &CancellationToken::new()).await;
        assert_eq!(second.next().await, Some(7));
        assert!(!relay.is_stopped());
    }

    #[tokio::test]
    async fn reset_clears_buffer_and_counters() {
        let relay = Arc::new(Relay::<u32>::new(0));
        let token = CancellationToken::new();
        relay.put(1, &token).await;
        relay.put(2, &token).await;
        let mut consumer = relay.consumer(CancellationToken::new());
        consumer.next().await;
        relay.stop();

        relay.reset();
        assert_eq!(relay.len(), 0);
        assert_eq!(relay.taken(), 0);
        assert!(!relay.is_stopped());
    }

    #[tokio::test]
    async fn consumers_end_when_the_producing_bus_stops() {
        let bus = Bus::<u32>::new("relay-bus");
        let relay = bus.attach(Arc::new(Relay::<u32>::new(2)));
        bus.set_to(relay.clone());

        let consumer = relay.consumer(CancellationToken::new());
        let drained = tokio::spawn(async move {
            use futures::StreamExt;
            consumer.into_stream().collect::<Vec<_>>().await
        });

        bus.start().await.unwrap();
        for n in 0..5 {
            bus.accept(n).await.unwrap();
        }
        bus.stop().await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), drained)
            .await
            .expect("consumer did not end")
            .unwrap();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }
}
