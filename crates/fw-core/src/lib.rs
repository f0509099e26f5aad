//! fw-core: Shared types for the Faderworks mixer-control engine
//!
//! This crate provides the foundational types used across all Faderworks
//! crates: channel identity, the control taxonomy, and error types.

mod channel;
mod error;

pub use channel::*;
pub use error::*;
