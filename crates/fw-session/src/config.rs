//! Session control configuration
//!
//! Explicitly constructed and owned by the session; passed by reference
//! where needed. There is no process-wide configuration object.

use fw_control::MutePointMask;
use serde::{Deserialize, Serialize};

/// Solo/mute behavior switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Soloing one channel clears explicit solo on all others
    pub exclusive_solo: bool,
    /// A muted channel that is itself soloed plays at unity
    pub solo_overrides_mute: bool,
    /// When false, engaging solo replaces any previous solo instead of
    /// accumulating (non-latched surface behavior)
    pub latched_solo: bool,
    /// Mute-point mask applied to newly created channels
    pub default_mute_points: MutePointMask,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exclusive_solo: false,
            solo_overrides_mute: false,
            latched_solo: true,
            default_mute_points: MutePointMask::ALL,
        }
    }
}
