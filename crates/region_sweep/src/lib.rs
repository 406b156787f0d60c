//! # Region Sweep
//!
//! Core engine for sweeping a marketplace search across many regions.
//! It expands a region selector into codes, checks each region through a
//! pluggable probe with bounded concurrency, deduplicates findings against a
//! persistent seen-set and publishes progress as a stream of events.

/// Shared types: requests, verdicts, events and errors
mod sweep_types;
pub use sweep_types::*;

/// Region groups loaded from the catalog file
mod region_catalog;
pub use region_catalog::*;

/// Timeout-bounded probe calls and verdict classification
mod probe_adapter;
pub use probe_adapter::*;

/// Persistent record of already reported result keys
mod seen_store;
pub use seen_store::*;

/// Event fan-out to subscribers
mod events;
pub use events::*;

/// Bounded worker pool driving a sweep
mod scheduler;
pub use scheduler::*;

/// Event-driven notifications
mod notifier;
pub use notifier::*;
