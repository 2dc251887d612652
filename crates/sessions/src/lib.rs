//! Background session maintenance: expiry of stale connections and
//! reconciliation of persisted state against the live adapter registry.

pub mod sweeper;

pub use sweeper::{SessionSweeper, SweepConfig};
