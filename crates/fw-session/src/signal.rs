//! Session signals and the lock-free mirror
//!
//! Signals are edge-triggered: one notification per externally visible
//! transition, produced at the mutation slot and drained to subscribers
//! off the render thread. The mirror is a handful of atomics any thread
//! may read without touching render-thread-owned state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use fw_core::ChannelId;

/// Notification emitted by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// Channel's externally observable solo status changed
    SoloChanged(ChannelId),
    /// Channel's observable muted value changed
    MuteChanged(ChannelId),
    /// Channel's overall solo-isolated value changed
    IsolateChanged(ChannelId),
    /// Channel's solo-safe flag changed
    SafeChanged(ChannelId),
    /// Something is now soloed / nothing is soloed anymore.
    /// Doubles as the "cancel-all-solo available" affordance.
    SoloActive(bool),
    /// A hard routing cycle appeared; the processing order is
    /// best-effort until the operator breaks the cycle
    FeedbackDetected,
    /// A full cycle-free sort succeeded after a degraded period
    GraphSorted,
    /// Response to a CreateChannel command
    ChannelCreated { callback_id: u32, id: ChannelId },
    ChannelRemoved(ChannelId),
    /// A queued command could not be applied
    CommandFailed { message: String },
}

/// Lock-free session state mirror (readable from any thread)
#[derive(Debug, Default)]
pub struct SessionMirror {
    solo_active: AtomicBool,
    graph_degraded: AtomicBool,
    channel_count: AtomicU32,
}

impl SessionMirror {
    pub fn solo_active(&self) -> bool {
        self.solo_active.load(Ordering::Acquire)
    }

    pub fn graph_degraded(&self) -> bool {
        self.graph_degraded.load(Ordering::Acquire)
    }

    pub fn channel_count(&self) -> u32 {
        self.channel_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_solo_active(&self, yn: bool) {
        self.solo_active.store(yn, Ordering::Release);
    }

    pub(crate) fn set_graph_degraded(&self, yn: bool) {
        self.graph_degraded.store(yn, Ordering::Release);
    }

    pub(crate) fn set_channel_count(&self, n: u32) {
        self.channel_count.store(n, Ordering::Release);
    }
}
