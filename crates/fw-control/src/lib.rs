//! fw-control: Per-channel control state machines
//!
//! The solo/mute/isolate control family of the Faderworks mixer:
//! - Master/slave aggregation with an incrementally maintained engaged
//!   count and edge-triggered hooks
//! - Solo state with self flag, by-others counters, and a ternary
//!   transition marker driving graph propagation
//! - Mute state gated by a per-stage mute-point bitmask
//! - Solo-isolate and solo-safe override flags
//! - Real-time-safe control curves for mute automation playback
//!
//! Nothing in this crate walks the routing graph or emits signals; it is
//! the per-channel layer the session propagation logic drives.

mod curve;
mod isolate;
mod master_link;
mod mute;
mod solo;

pub use curve::*;
pub use isolate::*;
pub use master_link::*;
pub use mute::*;
pub use solo::*;

/// Clamp-at-zero counter adjustment shared by the by-others counters.
/// A decrement below zero means a matching increment was never observed
/// (a graph-change race during teardown); audibility must not get stuck,
/// so the counter saturates instead of underflowing.
pub(crate) fn mod_counter(value: u32, delta: i32, what: &str) -> u32 {
    if delta >= 0 {
        value.saturating_add(delta as u32)
    } else {
        let dec = delta.unsigned_abs();
        if dec > value {
            log::debug!("{} underflow clamped ({} - {})", what, value, dec);
            0
        } else {
            value - dec
        }
    }
}
