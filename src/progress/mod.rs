//! Progress notifications: a lightweight stage begin/complete channel running
//! beside the bus lifecycle events.
//!
//! ## Contents
//! - [`ProgressKind`], [`ProgressEvent`] event classification and metadata
//! - [`ProgressBus`] thin wrapper over `tokio::sync::broadcast`
//! - [`Subscribe`], [`SubscriberSet`] isolated per-subscriber fan-out
//! - `LogWriter` (feature `logging`) renders events through `tracing`
//!
//! ## Wiring
//! ```text
//! Driver ── publish(ProgressEvent) ──► ProgressBus ──► SubscriberSet::listen
//!                                                        ├──► [queue S1] ─► worker ─► on_event()
//!                                                        └──► [queue SN] ─► worker ─► on_event()
//! ```

mod channel;
mod event;
#[cfg(feature = "logging")]
mod log;
mod subscribe;
mod subscriber_set;

pub use channel::ProgressBus;
pub use event::{ProgressEvent, ProgressKind};
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
