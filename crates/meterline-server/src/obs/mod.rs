//! In-process metrics.
//!
//! Counter and histogram families are stored as atomics behind `DashMap`
//! shards, updated by the instrumentation middleware and rendered by the
//! `/metrics` handler.

pub mod metrics;
