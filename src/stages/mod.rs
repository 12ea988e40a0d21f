//! Pipeline stages.
//!
//! Each stage is a [`Sink`] forwarding to at most one downstream sink. Stages
//! that keep per-run state also implement [`BusListener`](crate::BusListener)
//! and [`Resettable`](crate::Resettable); register them with
//! [`Bus::attach`](crate::Bus::attach).

mod batcher;
mod filter;
mod limiter;
mod quarantine;
mod sink;
mod splitter;
mod transform;

pub use batcher::Batcher;
pub use filter::Filter;
pub use limiter::{LimitMode, Limiter};
pub use quarantine::{BadBeanFilter, BadBeanTransfer};
pub use sink::{Collector, Sink, SinkFn, SinkRef};
pub use splitter::{Broadcast, RoundRobin, SplitStrategy, Splitter};
pub use transform::Transform;
