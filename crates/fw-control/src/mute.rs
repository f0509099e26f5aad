//! Per-channel mute state
//!
//! Aggregates every reason a channel can be muted — the explicit flag,
//! engaged mute masters, and other channels' solo activity — gated by a
//! per-stage mute-point bitmask.
//!
//! The render path never computes any of this: the session resolves the
//! solo context into cached mirror fields at the cycle's mutation slot,
//! and `rt_gain_at` only combines already-resolved booleans (plus one
//! binary search when mute is under automation playback).

use fw_core::MasterHandle;
use serde::{Deserialize, Serialize};

use crate::curve::{ControlCurve, CurveInterp};
use crate::master_link::{EngagedEdge, LinkTransition, MasterSlaveLink};

/// Unity gain (not muted at this point)
pub const UNITY_GAIN: f64 = 1.0;
/// Hard mute gain
pub const MUTE_GAIN: f64 = 0.0;

// ═══════════════════════════════════════════════════════════════════════════
// MUTE POINTS
// ═══════════════════════════════════════════════════════════════════════════

/// Stage in the signal path at which mute may independently apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MutePoint {
    PreFader = 0,
    PostFader = 1,
    Listen = 2,
    Main = 3,
}

impl MutePoint {
    pub const ALL: [MutePoint; 4] = [
        MutePoint::PreFader,
        MutePoint::PostFader,
        MutePoint::Listen,
        MutePoint::Main,
    ];

    #[inline]
    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Bitmask over mute points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutePointMask(u8);

impl MutePointMask {
    pub const NONE: MutePointMask = MutePointMask(0);
    pub const ALL: MutePointMask = MutePointMask(0b1111);

    #[inline]
    pub fn contains(self, point: MutePoint) -> bool {
        self.0 & point.bit() != 0
    }

    pub fn with(self, point: MutePoint) -> Self {
        MutePointMask(self.0 | point.bit())
    }

    pub fn without(self, point: MutePoint) -> Self {
        MutePointMask(self.0 & !point.bit())
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Out-of-range bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        MutePointMask(bits & Self::ALL.0)
    }
}

/// Where the mute value comes from on the render path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutomationMode {
    /// Live value set by the user / control surface
    #[default]
    Manual,
    /// Value read from the recorded automation curve
    Play,
}

// ═══════════════════════════════════════════════════════════════════════════
// MUTE STATE
// ═══════════════════════════════════════════════════════════════════════════

/// Per-channel mute aggregator
#[derive(Debug)]
pub struct MuteState {
    muted_by_self: bool,
    mute_points: MutePointMask,
    mode: AutomationMode,
    curve: ControlCurve,

    // Solo context mirrors, session-resolved once per cycle so the render
    // read combines plain booleans.
    soloed_by_self: bool,
    soloed_by_others: bool,
    muted_by_others_soloing: bool,
    solo_safe: bool,
    solo_overrides_mute: bool,

    edge: EngagedEdge,
    link: MasterSlaveLink,
}

impl Default for MuteState {
    fn default() -> Self {
        Self::new(MutePointMask::ALL)
    }
}

impl MuteState {
    pub fn new(mute_points: MutePointMask) -> Self {
        Self {
            muted_by_self: false,
            mute_points,
            mode: AutomationMode::Manual,
            curve: ControlCurve::new(CurveInterp::Step, 0.0),
            soloed_by_self: false,
            soloed_by_others: false,
            muted_by_others_soloing: false,
            solo_safe: false,
            solo_overrides_mute: false,
            edge: EngagedEdge::default(),
            link: MasterSlaveLink::new(),
        }
    }

    pub fn muted_by_self(&self) -> bool {
        self.muted_by_self
    }

    pub fn muted_by_masters(&self) -> bool {
        self.link.engaged_count() > 0
    }

    /// Observable muted value, regardless of mute points.
    pub fn muted(&self) -> bool {
        self.muted_by_self || self.muted_by_masters()
    }

    pub fn mute_points(&self) -> MutePointMask {
        self.mute_points
    }

    pub fn set_mute_points(&mut self, mask: MutePointMask) -> bool {
        if self.mute_points == mask {
            return false;
        }
        self.mute_points = mask;
        true
    }

    pub fn automation_mode(&self) -> AutomationMode {
        self.mode
    }

    pub fn set_automation_mode(&mut self, mode: AutomationMode) {
        self.mode = mode;
    }

    pub fn curve(&self) -> &ControlCurve {
        &self.curve
    }

    pub fn curve_mut(&mut self) -> &mut ControlCurve {
        &mut self.curve
    }

    /// Replace the automation curve (arrives through the command queue).
    pub fn set_curve(&mut self, curve: ControlCurve) {
        self.curve = curve;
    }

    /// Set the explicit mute flag. The contract is strict ordering:
    /// state mutation first, then the caller-supplied mute action (the
    /// owning channel hushing its buffers), and only then the Changed
    /// signal — emitted by the caller when this returns true — so signal
    /// listeners always observe final state.
    pub fn actually_set_mute<F: FnOnce(bool)>(&mut self, yn: bool, mute_action: F) -> bool {
        if self.muted_by_self == yn {
            return false;
        }
        let before = self.muted();
        self.muted_by_self = yn;
        mute_action(yn);
        before != self.muted()
    }

    // ═══════════════════════════════════════════════════════════════════
    // SOLO CONTEXT
    // ═══════════════════════════════════════════════════════════════════

    /// Session-resolved mirror update. Called at the cycle's mutation
    /// slot; render reads only combine the cached values.
    pub fn sync_solo_context(
        &mut self,
        soloed_by_self: bool,
        soloed_by_others: bool,
        muted_by_others_soloing: bool,
        solo_safe: bool,
        solo_overrides_mute: bool,
    ) {
        self.soloed_by_self = soloed_by_self;
        self.soloed_by_others = soloed_by_others;
        self.muted_by_others_soloing = muted_by_others_soloing;
        self.solo_safe = solo_safe;
        self.solo_overrides_mute = solo_overrides_mute;
    }

    // ═══════════════════════════════════════════════════════════════════
    // GAIN
    // ═══════════════════════════════════════════════════════════════════

    /// Gain contribution of mute state at one signal-path stage, from the
    /// live explicit flag.
    pub fn mute_gain_at(&self, point: MutePoint) -> f64 {
        self.gain_at(point, self.muted_by_self)
    }

    /// Render-path variant: in `Play` mode the explicit flag is replaced
    /// by the curve value at the transport position.
    ///
    /// # Audio Thread Safety
    /// - No allocation, no lock; at most one binary search
    #[inline]
    pub fn rt_gain_at(&self, point: MutePoint, pos: u64) -> f64 {
        let self_muted = match self.mode {
            AutomationMode::Manual => self.muted_by_self,
            AutomationMode::Play => self.curve.rt_safe_eval(pos) >= 0.5,
        };
        self.gain_at(point, self_muted)
    }

    fn gain_at(&self, point: MutePoint, self_muted: bool) -> f64 {
        if !self.mute_points.contains(point) {
            return UNITY_GAIN;
        }
        let soloed = self.soloed_by_self || self.soloed_by_others;
        if self_muted || self.muted_by_masters() {
            // An explicitly muted channel may be rescued by its own solo
            // state, unless it is solo-safe: safe means solo is ignored
            // entirely for gain purposes.
            if self.solo_overrides_mute && soloed && !self.solo_safe {
                return UNITY_GAIN;
            }
            return MUTE_GAIN;
        }
        if self.muted_by_others_soloing {
            return MUTE_GAIN;
        }
        UNITY_GAIN
    }

    // ═══════════════════════════════════════════════════════════════════
    // MASTER LINKAGE
    // ═══════════════════════════════════════════════════════════════════

    pub fn masters(&self) -> impl Iterator<Item = MasterHandle> + '_ {
        self.link.masters()
    }

    pub fn has_master(&self, handle: MasterHandle) -> bool {
        self.link.contains(handle)
    }

    pub fn master_count(&self) -> usize {
        self.link.len()
    }

    /// Attach a mute master with its current engagement.
    /// Returns true on an externally observable change.
    pub fn add_master(&mut self, handle: MasterHandle, engaged_now: bool) -> bool {
        let before = self.muted();
        if !self.link.add_master(handle, engaged_now, &mut self.edge) {
            return false;
        }
        self.edge.take();
        before != self.muted()
    }

    /// Detach a master (all when `None`). Losing a master must not flip
    /// the observable value by itself: when the aggregate disengages
    /// while it was carrying the mute, the value is folded into the
    /// explicit flag and re-asserted.
    pub fn remove_master(&mut self, handle: Option<MasterHandle>) -> usize {
        let was = self.muted();
        let n = self.link.remove_master(handle, &mut self.edge);
        if self.edge.take() == LinkTransition::Disengaged && was && !self.muted() {
            self.muted_by_self = true;
        }
        n
    }

    /// A mute master's value changed. Returns true on an externally
    /// observable change of this channel's muted value.
    pub fn master_changed(&mut self, handle: MasterHandle, engaged_now: bool) -> bool {
        let before = self.muted();
        self.link.master_changed(handle, engaged_now);
        before != self.muted()
    }

    /// Drop master handles whose channel no longer resolves.
    pub fn prune_masters<F: Fn(MasterHandle) -> bool>(&mut self, alive: F) -> usize {
        self.link.prune(alive)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::{ChannelId, ControlKind};

    fn mute_master(n: u32) -> MasterHandle {
        MasterHandle::new(ChannelId(n), ControlKind::Mute)
    }

    #[test]
    fn test_mute_point_mask() {
        let mask = MutePointMask::NONE
            .with(MutePoint::PreFader)
            .with(MutePoint::Main);
        assert!(mask.contains(MutePoint::PreFader));
        assert!(mask.contains(MutePoint::Main));
        assert!(!mask.contains(MutePoint::Listen));

        let mask = mask.without(MutePoint::PreFader);
        assert!(!mask.contains(MutePoint::PreFader));

        assert_eq!(MutePointMask::from_bits(0xff), MutePointMask::ALL);
    }

    #[test]
    fn test_muted_is_or_of_self_and_masters() {
        let mut m = MuteState::default();
        assert!(!m.muted());

        m.actually_set_mute(true, |_| {});
        assert!(m.muted());

        m.add_master(mute_master(5), true);
        assert!(m.muted());

        m.actually_set_mute(false, |_| {});
        // Master still engaged.
        assert!(m.muted());
        assert!(m.muted_by_masters());

        m.master_changed(mute_master(5), false);
        assert!(!m.muted());
    }

    #[test]
    fn test_mute_action_sees_final_state() {
        let mut m = MuteState::default();
        let mut observed = None;
        let changed = m.actually_set_mute(true, |yn| observed = Some(yn));
        assert!(changed);
        assert_eq!(observed, Some(true));

        // No-op set: the action must not fire.
        observed = None;
        assert!(!m.actually_set_mute(true, |yn| observed = Some(yn)));
        assert_eq!(observed, None);
    }

    #[test]
    fn test_engaging_master_on_self_muted_slave_not_observable() {
        let mut m = MuteState::default();
        m.actually_set_mute(true, |_| {});
        // Already muted by self: the master engaging changes nothing
        // observable, so no Changed should be emitted for it.
        assert!(!m.add_master(mute_master(9), true));
        assert!(m.muted());
    }

    #[test]
    fn test_remove_master_preserves_observable_value() {
        let mut m = MuteState::default();
        m.add_master(mute_master(9), true);
        assert!(m.muted());
        assert!(!m.muted_by_self());

        m.remove_master(Some(mute_master(9)));
        assert!(m.muted());
        assert!(m.muted_by_self());
    }

    #[test]
    fn test_gain_respects_mask() {
        let mut m = MuteState::new(MutePointMask::NONE.with(MutePoint::Main));
        m.actually_set_mute(true, |_| {});

        assert_eq!(m.mute_gain_at(MutePoint::Main), MUTE_GAIN);
        assert_eq!(m.mute_gain_at(MutePoint::PreFader), UNITY_GAIN);
        assert_eq!(m.mute_gain_at(MutePoint::Listen), UNITY_GAIN);
    }

    #[test]
    fn test_others_soloing_mutes_unmuted_channel() {
        let mut m = MuteState::default();
        m.sync_solo_context(false, false, true, false, false);
        assert_eq!(m.mute_gain_at(MutePoint::Main), MUTE_GAIN);

        // Safe channels never resolve muted_by_others_soloing true; the
        // session filters them out before the mirror update.
        m.sync_solo_context(false, false, false, true, false);
        assert_eq!(m.mute_gain_at(MutePoint::Main), UNITY_GAIN);
    }

    #[test]
    fn test_solo_overrides_mute() {
        let mut m = MuteState::default();
        m.actually_set_mute(true, |_| {});

        // Muted and soloed, override on: plays at unity.
        m.sync_solo_context(true, false, false, false, true);
        assert_eq!(m.mute_gain_at(MutePoint::Main), UNITY_GAIN);

        // Override off: mute wins.
        m.sync_solo_context(true, false, false, false, false);
        assert_eq!(m.mute_gain_at(MutePoint::Main), MUTE_GAIN);

        // Solo-safe: solo status ignored entirely, mute applies.
        m.sync_solo_context(true, false, false, true, true);
        assert_eq!(m.mute_gain_at(MutePoint::Main), MUTE_GAIN);
    }

    #[test]
    fn test_automation_playback_reads_curve() {
        let mut m = MuteState::default();
        m.curve_mut().add_point(100, 1.0);
        m.curve_mut().add_point(200, 0.0);
        m.set_automation_mode(AutomationMode::Play);

        assert_eq!(m.rt_gain_at(MutePoint::Main, 0), UNITY_GAIN);
        assert_eq!(m.rt_gain_at(MutePoint::Main, 150), MUTE_GAIN);
        assert_eq!(m.rt_gain_at(MutePoint::Main, 250), UNITY_GAIN);

        // Manual mode ignores the curve.
        m.set_automation_mode(AutomationMode::Manual);
        assert_eq!(m.rt_gain_at(MutePoint::Main, 150), UNITY_GAIN);
    }
}
