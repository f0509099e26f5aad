//! Session-wide solo coordination
//!
//! Operations that touch many channels and must look atomic to callers:
//! cancel-all, set-all, and the momentary press/release pair used by
//! control surfaces ("solo while holding the button"). Everything here
//! runs inside the single mutation slot, builds its target state first,
//! and never returns early out of a half-applied sweep.

use fw_core::{ChannelId, FwResult, GroupDisposition};

use crate::session::Session;

/// Immutable capture of the solo/mute-active set at one instant.
/// Owns plain data only; it cannot observe later channel mutations.
#[derive(Debug, Clone)]
pub struct SoloSnapshot {
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone, Copy)]
struct SnapshotEntry {
    id: ChannelId,
    self_solo: bool,
    self_mute: bool,
}

impl SoloSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Was anything explicitly soloed when the snapshot was taken?
    pub fn any_soloed(&self) -> bool {
        self.entries.iter().any(|e| e.self_solo)
    }
}

impl Session {
    /// Capture the explicit solo/mute flags of every channel.
    pub fn capture_solo_snapshot(&self) -> SoloSnapshot {
        let mut entries: Vec<SnapshotEntry> = self
            .channels()
            .map(|ch| SnapshotEntry {
                id: ch.id,
                self_solo: ch.solo.explicit_solo(),
                self_mute: ch.mute.muted_by_self(),
            })
            .collect();
        entries.sort_by_key(|e| e.id);
        SoloSnapshot { entries }
    }

    /// Clear explicit solo and both propagation counters on every
    /// channel. One session-wide notification, not one per channel.
    pub fn cancel_all_solo(&mut self, _disposition: GroupDisposition) {
        let ids = self.channel_ids();
        for id in ids {
            if let Some(ch) = self.channel_mut(id) {
                ch.solo.clear_all_solo_state();
            }
        }
        self.set_soloed_count(0);
        self.refresh_solo_active();
    }

    /// Engage or clear explicit solo on every soloable channel in one
    /// sweep.
    pub fn set_all_solo(&mut self, yn: bool, _disposition: GroupDisposition) {
        let ids = self.channel_ids();
        for id in ids {
            self.apply_self_solo(id, yn);
        }
    }

    /// Begin a momentary solo gesture: capture the pre-press state once,
    /// then engage solo on the pressed channel. Repeated presses during
    /// one gesture keep the original snapshot.
    pub fn momentary_solo_press(
        &mut self,
        id: ChannelId,
        disposition: GroupDisposition,
    ) -> FwResult<()> {
        if self.momentary.is_none() {
            self.momentary = Some(self.capture_solo_snapshot());
        }
        self.set_self_solo(id, true, disposition)
    }

    /// End a momentary solo gesture and restore exactly the captured
    /// set. `was_active` reports whether anything was soloed before the
    /// press; when false the cheap path clears everything instead of
    /// replaying. `exclusive` marks a gesture made in exclusive mode;
    /// the replay is literal either way and never re-enters the
    /// exclusive sweep, which would serially cancel restored entries.
    pub fn momentary_solo_release(&mut self, was_active: bool, _exclusive: bool) {
        let Some(snapshot) = self.momentary.take() else {
            return;
        };
        if !was_active {
            self.cancel_all_solo(GroupDisposition::NoGroup);
            return;
        }
        for entry in &snapshot.entries {
            self.apply_self_solo(entry.id, entry.self_solo);
            let _ = self.set_self_mute(entry.id, entry.self_mute, GroupDisposition::NoGroup);
        }
    }

    /// A momentary gesture is in flight.
    pub fn momentary_active(&self) -> bool {
        self.momentary.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::signal::SessionSignal;
    use fw_core::ChannelKind;

    const NO_GROUP: GroupDisposition = GroupDisposition::NoGroup;

    #[test]
    fn test_cancel_all_solo_batches_notification() {
        let mut s = Session::new(SessionConfig::default());
        let a = s.create_channel(ChannelKind::Audio, Some("A"));
        let b = s.create_channel(ChannelKind::Audio, Some("B"));
        let c = s.create_channel(ChannelKind::Bus, Some("C"));
        s.connect(a, c, false).unwrap();
        s.set_self_solo(a, true, NO_GROUP).unwrap();
        s.set_self_solo(b, true, NO_GROUP).unwrap();
        s.set_self_solo(c, true, NO_GROUP).unwrap();
        s.take_signals();

        s.cancel_all_solo(NO_GROUP);
        let signals = s.take_signals();
        // One session-wide notification; no per-channel storm.
        assert_eq!(signals, vec![SessionSignal::SoloActive(false)]);

        for id in [a, b, c] {
            let ch = s.channel(id).unwrap();
            assert!(!ch.solo.soloed());
            assert_eq!(ch.solo.by_others_upstream(), 0);
            assert_eq!(ch.solo.by_others_downstream(), 0);
        }
        assert!(!s.solo_active());
    }

    #[test]
    fn test_scenario_d_exclusive_solo() {
        let mut s = Session::new(SessionConfig {
            exclusive_solo: true,
            ..SessionConfig::default()
        });
        let p = s.create_channel(ChannelKind::Audio, Some("P"));
        let q = s.create_channel(ChannelKind::Audio, Some("Q"));

        s.set_self_solo(q, true, NO_GROUP).unwrap();
        assert!(s.channel(q).unwrap().solo.explicit_solo());
        s.take_signals();

        s.set_self_solo(p, true, NO_GROUP).unwrap();
        assert!(s.channel(p).unwrap().solo.explicit_solo());
        assert!(!s.channel(q).unwrap().solo.explicit_solo());

        // Q was cleared exactly once.
        let signals = s.take_signals();
        let q_changes = signals
            .iter()
            .filter(|sig| **sig == SessionSignal::SoloChanged(q))
            .count();
        assert_eq!(q_changes, 1);

        // Re-asserting P's solo does not touch Q again.
        s.set_self_solo(p, true, NO_GROUP).unwrap();
        assert!(s.take_signals().is_empty());
    }

    #[test]
    fn test_set_all_solo() {
        let mut s = Session::new(SessionConfig::default());
        let a = s.create_channel(ChannelKind::Audio, Some("A"));
        let b = s.create_channel(ChannelKind::Audio, Some("B"));

        s.set_all_solo(true, NO_GROUP);
        assert!(s.channel(a).unwrap().solo.soloed());
        assert!(s.channel(b).unwrap().solo.soloed());
        // The master stays out of solo sweeps.
        assert!(!s.channel(fw_core::ChannelId::MASTER).unwrap().solo.soloed());
        assert!(s.solo_active());

        s.set_all_solo(false, NO_GROUP);
        assert!(!s.solo_active());
    }

    #[test]
    fn test_momentary_press_release_restores_snapshot() {
        let mut s = Session::new(SessionConfig::default());
        let a = s.create_channel(ChannelKind::Audio, Some("A"));
        let b = s.create_channel(ChannelKind::Audio, Some("B"));
        let c = s.create_channel(ChannelKind::Audio, Some("C"));

        // Pre-gesture state: A soloed, B muted.
        s.set_self_solo(a, true, NO_GROUP).unwrap();
        s.set_self_mute(b, true, NO_GROUP).unwrap();
        let was_active = s.solo_active();

        s.momentary_solo_press(c, NO_GROUP).unwrap();
        assert!(s.momentary_active());
        assert!(s.channel(c).unwrap().solo.soloed());

        s.momentary_solo_release(was_active, false);
        assert!(!s.momentary_active());
        assert!(s.channel(a).unwrap().solo.explicit_solo());
        assert!(!s.channel(c).unwrap().solo.soloed());
        assert!(s.channel(b).unwrap().mute.muted_by_self());
        assert!(s.solo_active());
    }

    #[test]
    fn test_momentary_release_without_prior_solo_clears() {
        let mut s = Session::new(SessionConfig::default());
        let a = s.create_channel(ChannelKind::Audio, Some("A"));
        let b = s.create_channel(ChannelKind::Bus, Some("B"));
        s.connect(a, b, false).unwrap();

        let was_active = s.solo_active();
        assert!(!was_active);
        s.momentary_solo_press(b, NO_GROUP).unwrap();
        assert_eq!(s.channel(a).unwrap().solo.by_others_upstream(), 1);

        s.momentary_solo_release(was_active, false);
        assert!(!s.solo_active());
        assert_eq!(s.channel(a).unwrap().solo.by_others_upstream(), 0);
        assert!(!s.channel(b).unwrap().solo.soloed());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let mut s = Session::new(SessionConfig::default());
        let a = s.create_channel(ChannelKind::Audio, Some("A"));
        s.set_self_solo(a, true, NO_GROUP).unwrap();

        let snapshot = s.capture_solo_snapshot();
        assert!(snapshot.any_soloed());

        // Later mutations do not bleed into the captured set.
        s.set_self_solo(a, false, NO_GROUP).unwrap();
        assert!(snapshot.any_soloed());
        assert_eq!(snapshot.len(), 2); // master + A
    }
}
