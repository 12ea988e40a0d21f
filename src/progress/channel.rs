//! # Broadcast channel for progress events.
//!
//! [`ProgressBus`] is a thin wrapper around [`tokio::sync::broadcast`].
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **Bounded capacity**: one ring buffer shared by every receiver.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` events.
//! - **No persistence**: events published with no receiver are lost.

use tokio::sync::broadcast;

use crate::config::Config;
use crate::progress::ProgressEvent;

/// Cloneable broadcast handle for [`ProgressEvent`]s.
#[derive(Clone, Debug)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    /// Creates a channel with the given ring size (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Creates a channel sized by [`Config::progress_capacity`].
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.progress_capacity_clamped())
    }

    /// Publishes an event to every current receiver.
    pub fn publish(&self, ev: ProgressEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressKind;

    #[tokio::test]
    async fn receivers_see_events_published_after_subscribing() {
        let bus = ProgressBus::new(4);
        bus.publish(ProgressEvent::stage_begin("lost"));

        let mut rx = bus.subscribe();
        bus.publish(ProgressEvent::stage_begin("seen"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, ProgressKind::StageBegin);
        assert_eq!(ev.stage.as_deref(), Some("seen"));
    }
}
