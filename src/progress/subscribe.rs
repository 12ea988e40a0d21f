//! # Progress subscriber trait.
//!
//! [`Subscribe`] plugs a custom handler into a [`SubscriberSet`](crate::SubscriberSet).
//! Each subscriber gets its own bounded queue and worker task; a slow or
//! panicking subscriber only affects itself.

use async_trait::async_trait;

use crate::progress::ProgressEvent;

/// Handler for progress events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order for this subscriber.
    async fn on_event(&self, event: &ProgressEvent);

    /// Returns the subscriber name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
