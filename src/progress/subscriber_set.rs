//! # Non-blocking fan-out of progress events.
//!
//! [`SubscriberSet`] hands each [`ProgressEvent`] to every subscriber without
//! awaiting their processing.
//!
//! ## Architecture
//! ```text
//! ProgressBus ──► listener task ──► emit(event)
//!                                      ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!                                      │    (bounded)         └──────► panic → SubscriberPanicked
//!                                      └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `emit()` uses `try_send` and returns immediately.
//! - **Overflow**: the event is dropped for that subscriber only; a
//!   `SubscriberOverflow` event is published and a warning logged.
//! - **Isolation**: panics are caught with `catch_unwind`, reported as
//!   `SubscriberPanicked`, and the worker carries on with the next event.
//! - **Per-subscriber FIFO**, no ordering across subscribers.
//!
//! **Warning**: `AssertUnwindSafe` is used, so a subscriber that panics while
//! holding a lock may leave its own state inconsistent.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::progress::{ProgressBus, ProgressEvent, ProgressKind, Subscribe};

#[derive(Clone)]
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<ProgressEvent>>,
}

/// Fan-out coordinator with per-subscriber queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    listeners: Vec<JoinHandle<()>>,
    bus: ProgressBus,
    token: CancellationToken,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    ///
    /// Must be called inside a tokio runtime. Overflow and panic reports are
    /// published on `bus`.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: ProgressBus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<ProgressEvent>>(cap);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        warn!(subscriber = sub.name(), info = %info, "subscriber panicked");
                        bus_for_worker.publish(ProgressEvent::subscriber_panicked(sub.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            listeners: Vec::new(),
            bus,
            token: CancellationToken::new(),
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when the set has no subscriber.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Emits an event to every subscriber (clones the event).
    pub fn emit(&self, event: &ProgressEvent) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a shared event to every subscriber without cloning it.
    pub fn emit_arc(&self, event: Arc<ProgressEvent>) {
        fan_out(&self.channels, &self.bus, event);
    }

    /// Spawns a task forwarding everything published on the set's bus to the
    /// subscribers, until [`shutdown`](Self::shutdown).
    pub fn listen(&mut self) {
        let mut rx = self.bus.subscribe();
        let channels = self.channels.clone();
        let bus = self.bus.clone();
        let token = self.token.clone();

        self.listeners.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        // deliver what was published before shutdown
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => fan_out(&channels, &bus, Arc::new(ev)),
                                Err(TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                    received = rx.recv() => match received {
                        Ok(ev) => fan_out(&channels, &bus, Arc::new(ev)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "progress listener lagged; events skipped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        }));
    }

    /// Stops the listeners, closes every queue and waits for the workers to
    /// drain them.
    pub async fn shutdown(self) {
        self.token.cancel();
        for h in self.listeners {
            let _ = h.await;
        }
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

fn fan_out(channels: &[SubscriberChannel], bus: &ProgressBus, event: Arc<ProgressEvent>) {
    let is_overflow = event.kind == ProgressKind::SubscriberOverflow;

    for channel in channels {
        let reason = match channel.sender.try_send(Arc::clone(&event)) {
            Ok(()) => continue,
            Err(mpsc::error::TrySendError::Full(_)) => "full",
            Err(mpsc::error::TrySendError::Closed(_)) => "closed",
        };
        // overflow reports that overflow themselves are not re-published
        if !is_overflow {
            warn!(subscriber = channel.name, reason, "progress event dropped");
            bus.publish(ProgressEvent::subscriber_overflow(channel.name, reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::lock;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ProgressKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &ProgressEvent) {
            lock::lock(&self.seen).push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Grumpy;

    #[async_trait]
    impl Subscribe for Grumpy {
        async fn on_event(&self, event: &ProgressEvent) {
            if event.kind == ProgressKind::StageFailed {
                panic!("cannot stand failures");
            }
        }

        fn name(&self) -> &'static str {
            "grumpy"
        }
    }

    #[tokio::test]
    async fn published_events_reach_subscribers_before_shutdown_returns() {
        let bus = ProgressBus::new(16);
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![rec.clone()];
        let mut set = SubscriberSet::new(subs, bus.clone());
        set.listen();

        bus.publish(ProgressEvent::stage_begin("load"));
        bus.publish(ProgressEvent::stage_complete("load", 2));
        set.shutdown().await;

        assert_eq!(
            *lock::lock(&rec.seen),
            vec![ProgressKind::StageBegin, ProgressKind::StageComplete]
        );
    }

    #[tokio::test]
    async fn panicking_subscriber_is_isolated_and_reported() {
        let bus = ProgressBus::new(16);
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Grumpy), rec.clone()];
        let mut set = SubscriberSet::new(subs, bus.clone());
        set.listen();

        bus.publish(ProgressEvent::stage_failed("load", 0, "boom"));

        let reported = tokio::time::timeout(Duration::from_secs(5), async {
            while !lock::lock(&rec.seen).contains(&ProgressKind::SubscriberPanicked) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        set.shutdown().await;

        assert!(reported.is_ok());
        assert_eq!(lock::lock(&rec.seen)[0], ProgressKind::StageFailed);
    }
}
