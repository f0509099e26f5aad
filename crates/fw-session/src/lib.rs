//! fw-session: Session-wide control coordination
//!
//! Ties the per-channel control state machines (fw-control) to the
//! routing graph (fw-graph):
//! - Channel arena keyed by stable id (liveness check instead of weak
//!   pointers; master/slave links are handles into the arena)
//! - Solo propagation walks, master/slave fan-out, audibility resolution
//! - Session-wide coordinator operations (cancel-all, exclusive solo,
//!   momentary snapshot/restore)
//! - Lock-free command queue: writes from non-real-time threads are
//!   enqueued and applied at one mutation slot per render cycle
//! - Session control document persistence

mod channel;
mod commands;
mod config;
mod coordinator;
mod persist;
mod session;
mod signal;

pub use channel::*;
pub use commands::*;
pub use config::*;
pub use coordinator::*;
pub use persist::*;
pub use session::*;
pub use signal::*;
