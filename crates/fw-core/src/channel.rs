//! Channel identity and control taxonomy
//!
//! Core identifiers shared by the routing graph and the control layer:
//! - Type-safe channel IDs (stable across the session lifetime)
//! - Channel kinds (semantic label, not hardcoded behavior)
//! - Control kinds (tagged union replacing a polymorphic control base)
//! - Group disposition pass-through flag

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// CHANNEL IDENTIFIER
// ═══════════════════════════════════════════════════════════════════════════

/// Type-safe channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Master channel ID (always 0)
    pub const MASTER: ChannelId = ChannelId(0);

    /// Invalid/none channel ID
    pub const NONE: ChannelId = ChannelId(u32::MAX);

    /// Check if this is the master channel
    pub fn is_master(&self) -> bool {
        *self == Self::MASTER
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::NONE
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANNEL KIND
// ═══════════════════════════════════════════════════════════════════════════

/// Channel kind (semantic label, not hardcoded behavior)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Standard audio track (has clips)
    #[default]
    Audio,
    /// Bus/Group for submixing
    Bus,
    /// Aux/FX for send effects
    Aux,
    /// VCA (controls levels, no audio routing)
    Vca,
    /// Master output (special, single instance)
    Master,
}

impl ChannelKind {
    /// Get prefix for auto-naming
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Audio => "Audio",
            ChannelKind::Bus => "Bus",
            ChannelKind::Aux => "Aux",
            ChannelKind::Vca => "VCA",
            ChannelKind::Master => "Master",
        }
    }

    /// Whether channels of this kind participate in solo at all.
    /// The master output stays audible no matter what is soloed.
    pub fn can_solo(&self) -> bool {
        !matches!(self, ChannelKind::Master)
    }

    /// Whether other channels' solo activity may silence this kind.
    pub fn can_be_muted_by_others(&self) -> bool {
        !matches!(self, ChannelKind::Master)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTROL KIND
// ═══════════════════════════════════════════════════════════════════════════

/// Control kind: tagged union over the per-channel control family.
///
/// Master/slave links address a control as `(channel, kind)` rather than
/// holding a pointer to a polymorphic control object; liveness is checked
/// against the session arena on resolution, and a handle whose channel is
/// gone resolves to "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKind {
    Solo,
    Mute,
    SoloIsolate,
    SoloSafe,
    Gain,
}

/// Reference to a specific control on a specific channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MasterHandle {
    pub channel: ChannelId,
    pub kind: ControlKind,
}

impl MasterHandle {
    pub fn new(channel: ChannelId, kind: ControlKind) -> Self {
        Self { channel, kind }
    }

    pub fn solo(channel: ChannelId) -> Self {
        Self::new(channel, ControlKind::Solo)
    }

    pub fn mute(channel: ChannelId) -> Self {
        Self::new(channel, ControlKind::Mute)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// GROUP DISPOSITION
// ═══════════════════════════════════════════════════════════════════════════

/// How an externally issued command relates to the user-defined channel
/// group of its target.
///
/// The control layer accepts and forwards this flag; group fan-out itself
/// is resolved by the group layer, which sits outside this subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupDisposition {
    /// Apply to the target and let the group layer fan out normally
    #[default]
    UseGroup,
    /// Apply to the target only
    NoGroup,
    /// Apply to every group member except the target
    InverseGroup,
}
