//! Top-level facade crate for meterline.
//!
//! Re-exports core types and the server library so users can depend on a single crate.

pub mod core {
    pub use meterline_core::*;
}

pub mod server {
    pub use meterline_server::*;
}
