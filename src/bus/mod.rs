//! The bus: lifecycle state machine and listener protocol.
//!
//! ## Contents
//! - [`Bus`] the pipeline root (`start` / `accept` / `stop`)
//! - [`BusPhase`] lifecycle phases
//! - [`BusEvent`] immutable notification payload
//! - [`BusListener`] the callbacks fired around runs and trips
//! - [`BusConductor`] item-type-agnostic control handed to stages
//! - [`Resettable`] explicit reset hooks for stateful components
//!
//! ## Quick reference
//! ```text
//! driver ──► Bus::start ──► starting
//!        ──► Bus::accept ──► trip-beginning (first item) ──► head stage ──► ... ──► sink
//!        ──► Bus::stop  ──► trip-ending ──► stopping ──► terminated
//!
//! any stage ──► BusConductor::request_bus_stop ──► stop-requested ──► stop command
//! any stage ──► BusConductor::clean_bus        ──► trip-ending
//! failure   ──► crashed ──► terminated           (exactly once)
//! ```

mod conductor;
mod core;
mod event;
mod listener;
mod phase;

pub use self::core::{Bus, StopCommand};
pub use conductor::{BusConductor, Resettable};
pub use event::BusEvent;
pub use listener::BusListener;
pub use phase::BusPhase;
