//! Application Layer - driver and caller-side transitions

pub mod driver;

pub use driver::{DriverError, ReplayDriver, ReplaySummary, Tick, TickOutcome};
