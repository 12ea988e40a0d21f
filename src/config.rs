//! # Pipeline configuration.
//!
//! Provides [`Config`] centralized settings shared by a bus and the pieces
//! assembled around it.
//!
//! Config is used in three ways:
//! 1. **Bus creation**: `Bus::with_config(&config)` takes the bus name
//! 2. **Relay defaults**: `Relay::from_config(&config)` takes the capacity
//! 3. **Progress channel**: `ProgressBus::from_config(&config)` takes the ring size
//!
//! ## Sentinel values
//! - `relay_capacity = 0` → unbounded relay
//! - `progress_capacity = 0` → clamped to 1

/// Shared configuration for a pipeline.
///
/// ## Field semantics
/// - `name`: bus name used in logs and events
/// - `relay_capacity`: default relay capacity (`0` = unbounded)
/// - `progress_capacity`: progress broadcast ring size (min 1; clamped)
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of the bus, reported in every log line and event it produces.
    pub name: String,

    /// Capacity of relays built with [`Relay::from_config`](crate::Relay::from_config).
    ///
    /// - `0` = unbounded
    /// - `n > 0` = producers wait once `n` items are buffered
    pub relay_capacity: usize,

    /// Capacity of the progress broadcast ring buffer.
    ///
    /// Receivers lagging further than this skip older events.
    pub progress_capacity: usize,
}

impl Config {
    /// Returns the relay capacity as an `Option`.
    ///
    /// - `None` → unbounded
    /// - `Some(n)` → at most `n` buffered items
    #[inline]
    pub fn relay_limit(&self) -> Option<usize> {
        if self.relay_capacity == 0 {
            None
        } else {
            Some(self.relay_capacity)
        }
    }

    /// Returns a progress capacity clamped to a minimum of 1.
    #[inline]
    pub fn progress_capacity_clamped(&self) -> usize {
        self.progress_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `name = "bus"`
    /// - `relay_capacity = 0` (unbounded)
    /// - `progress_capacity = 1024`
    fn default() -> Self {
        Self {
            name: "bus".to_string(),
            relay_capacity: 0,
            progress_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_relay_capacity_is_unbounded() {
        let cfg = Config::default();
        assert_eq!(cfg.relay_limit(), None);

        let cfg = Config {
            relay_capacity: 4,
            ..Config::default()
        };
        assert_eq!(cfg.relay_limit(), Some(4));
    }

    #[test]
    fn progress_capacity_is_clamped() {
        let cfg = Config {
            progress_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.progress_capacity_clamped(), 1);
    }
}
