//! fw-graph: Signal-routing graph for the Faderworks mixer engine
//!
//! Directed graph of mixing channels with:
//! - Triple-view edge storage (feeds, fed-by, combined edge map)
//! - Kahn topological sort for the processing order
//! - Send-only edges excluded from hard cycle detection
//! - Best-effort degraded ordering when feedback is present

mod graph;

pub use graph::*;
