//! Pull side of a [`Relay`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::Stream;
use tokio_util::sync::CancellationToken;

use super::{Relay, Take};

/// Pull-sequence over a [`Relay`].
///
/// Each [`next`](RelayConsumer::next) returns an item, or `None` once the relay
/// is stopped or this consumer's token is cancelled. The sequence can be
/// resumed after the relay is reset.
pub struct RelayConsumer<T> {
    relay: Arc<Relay<T>>,
    token: CancellationToken,
}

/// Keeps the relay's waiting counter accurate however the wait ends.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> RelayConsumer<T> {
    pub(crate) fn new(relay: Arc<Relay<T>>, token: CancellationToken) -> Self {
        Self { relay, token }
    }

    /// The relay this consumer pulls from.
    pub fn relay(&self) -> &Arc<Relay<T>> {
        &self.relay
    }

    /// Waits for the next item.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            if self.token.is_cancelled() {
                return None;
            }

            let notified = self.relay.readable().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.relay.try_take() {
                Take::Item(item) => return Some(item),
                Take::Stopped => {
                    // pass the wake-up on to the next waiting consumer
                    self.relay.readable().notify_one();
                    return None;
                }
                Take::Empty => {}
            }

            let _waiting = Waiting::enter(self.relay.waiting_counter());
            tokio::select! {
                _ = &mut notified => {}
                _ = self.token.cancelled() => return None,
            }
        }
    }

    /// Turns the consumer into a [`Stream`] of items.
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut consumer| async move {
            consumer.next().await.map(|item| (item, consumer))
        })
    }
}
