//! # Control surfaces a bus hands out to the pieces wired around it.
//!
//! - [`BusConductor`]: the item-type-agnostic face of a bus. Stages that need
//!   to end a trip or ask for a stop keep a `Weak<dyn BusConductor>`.
//! - [`Resettable`]: explicit reset hooks a bus calls on the components
//!   registered with it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::{BusListener, BusPhase};
use crate::error::BusError;

/// Item-type-agnostic control of a bus.
#[async_trait]
pub trait BusConductor: Send + Sync + 'static {
    /// Name of the bus.
    fn name(&self) -> &str;

    /// Current phase.
    fn phase(&self) -> BusPhase;

    /// Registers a listener; dispatch order is registration order.
    fn add_bus_listener(&self, listener: Arc<dyn BusListener>);

    /// Deregisters a listener (pointer identity). Returns `false` if unknown.
    fn remove_bus_listener(&self, listener: &Arc<dyn BusListener>) -> bool;

    /// Ends the current trip, if any, without stopping the bus.
    async fn clean_bus(&self) -> Result<(), BusError>;

    /// Asks whoever drives the bus to stop it. Safe from any thread.
    fn request_bus_stop(&self);
}

/// Reset hooks for stateful pipeline components.
///
/// A soft reset prepares a component for another run; a hard reset also
/// discards anything it accumulated (counters, captured items).
pub trait Resettable: Send + Sync + 'static {
    /// Prepares for another run.
    fn soft_reset(&self) {}

    /// Returns to the freshly constructed state.
    fn hard_reset(&self);
}
