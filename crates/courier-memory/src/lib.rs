//! `courier-memory` – where the tracked user has been.
//!
//! Keeps the location history in a local SQLite database and turns the noisy,
//! sometimes out-of-order stream of arrival/departure notifications into a
//! clean arrived/left history.
//!
//! # Modules
//!
//! - [`log`] – the append-only [`LocationLog`][log::LocationLog] trait with a
//!   SQLite backend ([`SqliteLocationLog`][log::SqliteLocationLog]) and an
//!   in-memory one ([`MemoryLocationLog`][log::MemoryLocationLog]).
//! - [`tracker`] – [`LocationTracker`][tracker::LocationTracker]: the
//!   arrival/departure state machine that discards stale departures.

pub mod log;
pub mod tracker;

pub use log::{LocationLog, LocationLogError, MemoryLocationLog, SqliteLocationLog};
pub use tracker::{LocationState, LocationTracker, UpdateOutcome};
