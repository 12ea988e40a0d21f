//! # LogWriter: progress events rendered through `tracing`.
//!
//! ## Example output
//! ```text
//! INFO stage="orders" "stage begin"
//! INFO stage="orders" count=42 "stage complete"
//! WARN stage="orders" count=3 reason="bus crashed: boom" "stage failed"
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::progress::{ProgressEvent, ProgressKind, Subscribe};

/// Subscriber that logs every progress event.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &ProgressEvent) {
        let stage = e.stage.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("unknown");
        match e.kind {
            ProgressKind::StageBegin => info!(seq = e.seq, stage, "stage begin"),
            ProgressKind::StageComplete => {
                info!(seq = e.seq, stage, count = e.count, "stage complete")
            }
            ProgressKind::StageFailed => {
                warn!(seq = e.seq, stage, count = e.count, reason, "stage failed")
            }
            ProgressKind::SubscriberOverflow => {
                warn!(seq = e.seq, subscriber = stage, reason, "subscriber overflow")
            }
            ProgressKind::SubscriberPanicked => {
                warn!(seq = e.seq, subscriber = stage, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
