//! # Progress events.
//!
//! [`ProgressEvent`] reports that a pipeline stage began, completed or failed.
//! Each event carries a global sequence number that increases monotonically;
//! use `seq` to restore order when subscribers see events out of order.
//!
//! ## Example
//! ```rust
//! use beanbus::{ProgressEvent, ProgressKind};
//!
//! let ev = ProgressEvent::stage_complete("orders", 42);
//!
//! assert_eq!(ev.kind, ProgressKind::StageComplete);
//! assert_eq!(ev.stage.as_deref(), Some("orders"));
//! assert_eq!(ev.count, Some(42));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

static PROGRESS_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// A stage is about to process its input.
    ///
    /// Sets:
    /// - `stage`: stage name
    StageBegin,

    /// A stage processed all of its input.
    ///
    /// Sets:
    /// - `stage`: stage name
    /// - `count`: items processed
    StageComplete,

    /// A stage ended with a failure.
    ///
    /// Sets:
    /// - `stage`: stage name
    /// - `count`: items processed before the failure
    /// - `reason`: failure message
    StageFailed,

    /// A subscriber dropped an event (queue full or worker gone).
    ///
    /// Sets:
    /// - `stage`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    /// A subscriber panicked while handling an event.
    ///
    /// Sets:
    /// - `stage`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,
}

impl ProgressKind {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProgressKind::StageBegin => "stage_begin",
            ProgressKind::StageComplete => "stage_complete",
            ProgressKind::StageFailed => "stage_failed",
            ProgressKind::SubscriberOverflow => "subscriber_overflow",
            ProgressKind::SubscriberPanicked => "subscriber_panicked",
        }
    }
}

/// Progress event with optional metadata.
#[derive(Clone, Debug)]
pub struct ProgressEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: ProgressKind,
    /// Stage (or subscriber) name.
    pub stage: Option<Arc<str>>,
    /// Item count, when meaningful.
    pub count: Option<u64>,
    /// Human-readable reason (failures, overflow details).
    pub reason: Option<Arc<str>>,
}

impl ProgressEvent {
    /// Creates an event of the given kind with the current time and next sequence number.
    pub fn new(kind: ProgressKind) -> Self {
        Self {
            seq: PROGRESS_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            stage: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a stage name.
    #[inline]
    pub fn with_stage(mut self, stage: impl Into<Arc<str>>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Attaches an item count.
    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a [`ProgressKind::StageBegin`] event.
    #[inline]
    pub fn stage_begin(stage: impl Into<Arc<str>>) -> Self {
        Self::new(ProgressKind::StageBegin).with_stage(stage)
    }

    /// Creates a [`ProgressKind::StageComplete`] event.
    #[inline]
    pub fn stage_complete(stage: impl Into<Arc<str>>, count: u64) -> Self {
        Self::new(ProgressKind::StageComplete)
            .with_stage(stage)
            .with_count(count)
    }

    /// Creates a [`ProgressKind::StageFailed`] event.
    #[inline]
    pub fn stage_failed(stage: impl Into<Arc<str>>, count: u64, reason: impl Into<Arc<str>>) -> Self {
        Self::new(ProgressKind::StageFailed)
            .with_stage(stage)
            .with_count(count)
            .with_reason(reason)
    }

    #[inline]
    pub(crate) fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Self::new(ProgressKind::SubscriberOverflow)
            .with_stage(subscriber)
            .with_reason(reason)
    }

    #[inline]
    pub(crate) fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Self::new(ProgressKind::SubscriberPanicked)
            .with_stage(subscriber)
            .with_reason(info)
    }

    /// True for events produced by the subscriber machinery itself.
    #[inline]
    pub fn is_subscriber_report(&self) -> bool {
        matches!(
            self.kind,
            ProgressKind::SubscriberOverflow | ProgressKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = ProgressEvent::stage_begin("a");
        let b = ProgressEvent::stage_begin("b");
        assert!(b.seq > a.seq);
    }

    #[test]
    fn failure_carries_reason_and_count() {
        let ev = ProgressEvent::stage_failed("load", 3, "bus crashed: boom");
        assert_eq!(ev.kind.as_label(), "stage_failed");
        assert_eq!(ev.count, Some(3));
        assert_eq!(ev.reason.as_deref(), Some("bus crashed: boom"));
        assert!(!ev.is_subscriber_report());
    }
}
