//! HTTP middleware.

pub mod instrument;

pub use instrument::{InstrumentLayer, Instrumented};
