//! # Bus lifecycle phases.
//!
//! ```text
//! Ready ──start──► Starting ──► Running ──stop──► Stopping ──► Stopped
//!                     │            │                 │            ▲
//!                     └────────────┴──► Crashed ◄────┘            │
//!                                          └──── terminated ──────┘
//! ```
//!
//! While `Running`, a bus alternates between tripping and not tripping; that
//! flag is kept alongside the phase rather than as a phase of its own.

use std::fmt;

/// Phase of a [`Bus`](crate::Bus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusPhase {
    /// Initial phase; `start` is allowed.
    Ready,
    /// `starting` listeners are being notified.
    Starting,
    /// Items may be accepted.
    Running,
    /// `stopping` listeners are being notified.
    Stopping,
    /// Terminal until reset.
    Stopped,
    /// A failure is being reported; always followed by `Stopped`.
    Crashed,
}

impl BusPhase {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusPhase::Ready => "ready",
            BusPhase::Starting => "starting",
            BusPhase::Running => "running",
            BusPhase::Stopping => "stopping",
            BusPhase::Stopped => "stopped",
            BusPhase::Crashed => "crashed",
        }
    }

    /// True once the bus needs a reset before it can start again.
    #[inline]
    pub fn is_finished(&self) -> bool {
        matches!(self, BusPhase::Stopped | BusPhase::Crashed)
    }
}

impl fmt::Display for BusPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
