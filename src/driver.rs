//! # Driver: the loop that feeds a bus.
//!
//! [`Driver::run`] pulls items from a [`Source`] and hands them to a bus:
//!
//! ```text
//! run(source, token)
//!   ├─► install stop command (cancels a child of `token`)
//!   ├─► publish StageBegin ─► bus.start()
//!   ├─► loop { select! { stop requested ─► break, source.next() ─► bus.accept(item) } }
//!   ├─► bus.stop()
//!   └─► publish StageComplete / StageFailed
//! ```
//!
//! ## Rules
//! - A stop request on the bus (a limiter reaching its limit, a supervisor,
//!   any caller of `request_bus_stop`) ends the loop before the next item.
//! - A start or accept failure has already crashed the bus; it is returned
//!   as is and the bus is not stopped again.
//! - The driver owns the bus stop command while it runs and clears it after.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{Bus, StopCommand};
use crate::error::BusError;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::relay::RelayConsumer;

/// Pull-based item source.
#[async_trait]
pub trait Source<T>: Send {
    /// Next item, or `None` when exhausted.
    async fn next(&mut self) -> Option<T>;
}

/// [`Source`] over any iterator.
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    /// Wraps anything iterable.
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

#[async_trait]
impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    async fn next(&mut self) -> Option<I::Item> {
        self.iter.next()
    }
}

#[async_trait]
impl<T: Send + 'static> Source<T> for RelayConsumer<T> {
    async fn next(&mut self) -> Option<T> {
        RelayConsumer::next(self).await
    }
}

/// Summary of one [`Driver::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriveOutcome {
    /// Items accepted by the bus.
    pub accepted: u64,
    /// True if a stop request or the caller's token ended the run before the
    /// source was exhausted.
    pub stopped_early: bool,
}

/// Feeds a bus from a source, start to stop.
pub struct Driver<T> {
    name: Arc<str>,
    bus: Arc<Bus<T>>,
    progress: Option<ProgressBus>,
}

impl<T: Send + 'static> Driver<T> {
    /// Creates a driver for `bus`; `name` labels its progress events.
    pub fn new(name: impl Into<Arc<str>>, bus: Arc<Bus<T>>) -> Self {
        Self {
            name: name.into(),
            bus,
            progress: None,
        }
    }

    /// Publishes stage progress on `progress`.
    pub fn with_progress(mut self, progress: ProgressBus) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The driven bus.
    pub fn bus(&self) -> &Arc<Bus<T>> {
        &self.bus
    }

    /// Runs the bus once over `source`.
    ///
    /// ### Errors
    /// The error returned by `start`, `accept` or `stop`.
    pub async fn run<S>(&self, mut source: S, token: &CancellationToken) -> Result<DriveOutcome, BusError>
    where
        S: Source<T>,
    {
        let stop = token.child_token();
        let for_command = stop.clone();
        let command: StopCommand = Arc::new(move || for_command.cancel());
        self.bus.set_stop_command(Some(command));

        let result = self.drive(&mut source, &stop).await;
        self.bus.set_stop_command(None);

        match &result {
            Ok(outcome) => {
                info!(
                    stage = %self.name,
                    accepted = outcome.accepted,
                    stopped_early = outcome.stopped_early,
                    "drive complete"
                );
                self.publish(ProgressEvent::stage_complete(self.name.clone(), outcome.accepted));
            }
            Err((accepted, e)) => {
                self.publish(ProgressEvent::stage_failed(
                    self.name.clone(),
                    *accepted,
                    e.to_string(),
                ));
            }
        }
        result.map_err(|(_, e)| e)
    }

    async fn drive<S>(&self, source: &mut S, stop: &CancellationToken) -> Result<DriveOutcome, (u64, BusError)>
    where
        S: Source<T>,
    {
        self.publish(ProgressEvent::stage_begin(self.name.clone()));
        self.bus.start().await.map_err(|e| (0, e))?;

        let mut outcome = DriveOutcome::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!(stage = %self.name, "stop requested; ending drive");
                    outcome.stopped_early = true;
                    break;
                }
                item = source.next() => item,
            };
            let Some(item) = next else { break };
            self.bus
                .accept(item)
                .await
                .map_err(|e| (outcome.accepted, e))?;
            outcome.accepted += 1;
        }

        self.bus.stop().await.map_err(|e| (outcome.accepted, e))?;
        Ok(outcome)
    }

    fn publish(&self, ev: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.publish(ev);
        }
    }
}
