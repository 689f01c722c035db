//! meterline server library entry.
//!
//! Wires config, the metrics registry, the instrumentation middleware and
//! the HTTP handlers into one router. It is intended to be consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod middleware;
pub mod obs;
pub mod ops;
pub mod router;
pub mod shutdown;
