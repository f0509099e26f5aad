//! Session channel: control strip state for one mixing channel
//!
//! Owns the per-channel control family. Audio buffers, DSP, and clip
//! playback live elsewhere; this is only the "is it audible, and why"
//! side of a channel.

use fw_core::{ChannelId, ChannelKind};
use fw_control::{
    MutePoint, MutePointMask, MuteState, SoloIsolateState, SoloSafeState, SoloState, UNITY_GAIN,
};

/// One mixing channel's control state
#[derive(Debug)]
pub struct Channel {
    /// Unique identifier (stable for the channel's lifetime)
    pub id: ChannelId,
    /// Channel type
    pub kind: ChannelKind,
    /// Display name
    pub name: String,

    pub solo: SoloState,
    pub mute: MuteState,
    pub isolate: SoloIsolateState,
    pub safe: SoloSafeState,

    /// Per-mute-point gains resolved at the cycle's mutation slot. The
    /// render path reads these; it never recomputes them.
    resolved_gain: [f64; 4],
}

impl Channel {
    pub fn new(id: ChannelId, kind: ChannelKind, name: &str, mute_points: MutePointMask) -> Self {
        Self {
            id,
            kind,
            name: name.to_string(),
            solo: SoloState::new(),
            mute: MuteState::new(mute_points),
            isolate: SoloIsolateState::new(),
            safe: SoloSafeState::new(),
            resolved_gain: [UNITY_GAIN; 4],
        }
    }

    /// Already-resolved gain at a signal-path stage (lock-free read).
    #[inline]
    pub fn gain_at(&self, point: MutePoint) -> f64 {
        self.resolved_gain[point as usize]
    }

    /// Audible on the main output right now.
    #[inline]
    pub fn audible(&self) -> bool {
        self.gain_at(MutePoint::Main) > 0.0
    }

    pub(crate) fn set_resolved_gain(&mut self, point: MutePoint, gain: f64) {
        self.resolved_gain[point as usize] = gain;
    }
}
