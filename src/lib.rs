//! # beanbus
//!
//! **beanbus** assembles item-processing pipelines out of small stages and
//! runs them under a strict lifecycle.
//!
//! A [`Bus`] owns the lifecycle state machine and the head of a chain of
//! [`Sink`] stages. Drivers push items into the bus; the bus brackets runs and
//! trips with [`BusListener`] notifications and turns any unhandled failure
//! into a single, well-ordered crash.
//!
//! ## Architecture
//! ```text
//!   Source (iterator / RelayConsumer)
//!        │
//!        ▼
//!   Driver::run ─── publish ───────────────────────────────► ProgressBus ─► SubscriberSet
//!        │                                                                    (per-subscriber queues)
//!        ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Bus<T>                                                          │
//! │  - phase: Ready → Starting → Running → Stopping → Stopped        │
//! │  - listeners: starting / trip / stopping / crashed / terminated  │
//! │  - resettable components                                         │
//! └──────┬───────────────────────────────────────────────────────────┘
//!        ▼ accept(item)
//!   BadBeanFilter ─► Transform ─► Filter ─► Limiter ─► Batcher ─► Splitter ─┬─► Collector
//!        │                                                                   ├─► SinkFn
//!        └─► bad-bean handler                                                └─► Relay ─► consumers
//!
//!   StatefulJob ... StatefulJob ─► StatefulBusSupervisor ─► stop / crash (exactly once)
//! ```
//!
//! ### Lifecycle
//! ```text
//! start()  ─► starting ─► Running
//! accept() ─► [first item of a trip] trip-beginning ─► stages
//! stop()   ─► [tripping] trip-ending ─► stopping ─► terminated ─► Stopped
//! failure  ─► crashed ─► terminated ─► Stopped           (once per run)
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types / traits                                  |
//! |-----------------|----------------------------------------------------------|-----------------------------------------------------|
//! | **Bus**         | Lifecycle state machine and listener protocol.           | [`Bus`], [`BusListener`], [`BusEvent`], [`BusPhase`] |
//! | **Stages**      | Transform, filter, batch, limit, split, quarantine.      | [`Sink`], [`Transform`], [`Filter`], [`Batcher`]    |
//! | **Relay**       | Bounded multi-consumer hand-off with cooperative stop.   | [`Relay`], [`RelayConsumer`]                        |
//! | **Driving**     | Feed a bus from an iterator or a relay.                  | [`Driver`], [`Source`], [`IterSource`]              |
//! | **Supervision** | Turn job state changes into one stop/crash decision.     | [`StatefulBusSupervisor`], [`StatefulJob`]          |
//! | **Progress**    | Stage begin/complete notifications with fan-out.         | [`ProgressBus`], [`Subscribe`], [`SubscriberSet`]   |
//! | **Errors**      | Typed errors for buses and jobs.                         | [`BusError`], [`JobError`]                          |
//!
//! ## Optional features
//! - `logging`: exports a [`Subscribe`] implementation, `LogWriter`, that
//!   renders progress events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use beanbus::{Bus, Collector, Driver, Filter, IterSource, Transform};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), beanbus::BusError> {
//!     let bus = Bus::<&'static str>::new("fruit");
//!     let out = Arc::new(Collector::<String>::new());
//!
//!     let shout: Arc<Transform<&'static str, String>> =
//!         Arc::new(Transform::map(|s: &'static str| s.to_uppercase()).with_to(out.clone()));
//!     let short = bus.attach(Arc::new(
//!         Filter::new(|s: &&'static str| s.len() <= 5).with_to(shout),
//!     ));
//!     bus.set_to(short);
//!
//!     let outcome = Driver::new("fruit", bus)
//!         .run(IterSource::new(["apple", "banana", "fig"]), &CancellationToken::new())
//!         .await?;
//!
//!     assert_eq!(outcome.accepted, 3);
//!     assert_eq!(out.items(), vec!["APPLE", "FIG"]);
//!     Ok(())
//! }
//! ```

mod bus;
mod config;
mod driver;
mod error;
mod jobs;
mod lock;
mod progress;
mod relay;
mod stages;
mod supervisor;

// ---- Public re-exports ----

pub use bus::{Bus, BusConductor, BusEvent, BusListener, BusPhase, Resettable, StopCommand};
pub use config::Config;
pub use driver::{DriveOutcome, Driver, IterSource, Source};
pub use error::{BusError, JobError};
pub use jobs::{Job, JobFn, JobRef, JobState, StateListener, StatefulJob};
pub use progress::{ProgressBus, ProgressEvent, ProgressKind, Subscribe, SubscriberSet};
pub use relay::{Relay, RelayConsumer};
pub use stages::{
    BadBeanFilter, BadBeanTransfer, Batcher, Broadcast, Collector, Filter, LimitMode, Limiter,
    RoundRobin, Sink, SinkFn, SinkRef, SplitStrategy, Splitter, Transform,
};
pub use supervisor::{Decision, StatefulBusSupervisor, Supervision};

// Optional: expose a built-in progress logger.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use progress::LogWriter;
