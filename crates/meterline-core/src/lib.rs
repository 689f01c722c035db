//! meterline core: transport-agnostic metric primitives and error types.
//!
//! This crate defines the exposition-format rules (metric names, label
//! escaping, sample formatting) and the error surface shared by the server
//! and any embedding application. It intentionally carries no transport or
//! runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MeterlineError`/`Result` so a bad
//! label set can never take down request handling.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod expo;

/// Shared result type.
pub use error::{MeterlineError, Result};
