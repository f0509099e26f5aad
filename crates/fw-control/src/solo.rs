//! Per-channel solo state
//!
//! Tracks three independent inputs to "is this channel soloed":
//! - the explicit self-solo flag (user pressed the button)
//! - engaged solo masters (a soloed VCA the channel is slaved to)
//! - by-others counters maintained by graph propagation
//!
//! Every mutation recomputes a ternary transition marker comparing the
//! overall soloed value before and after. The session uses the marker to
//! keep its session-wide solo bookkeeping incremental and to decide when
//! an upstream push is due; pushes happen only on boundary transitions,
//! so repeated identical calls never double-push.

use fw_core::MasterHandle;

use crate::master_link::{EngagedEdge, LinkTransition, MasterSlaveLink};
use crate::mod_counter;

/// Overall-soloed boundary crossing of a single mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoloTransition {
    #[default]
    None,
    IntoSolo,
    OutOfSolo,
}

impl SoloTransition {
    fn from_edge(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => SoloTransition::IntoSolo,
            (true, false) => SoloTransition::OutOfSolo,
            _ => SoloTransition::None,
        }
    }
}

/// Per-channel solo state machine
#[derive(Debug, Default)]
pub struct SoloState {
    self_solo: bool,
    by_upstream: u32,
    by_downstream: u32,
    transition: SoloTransition,
    edge: EngagedEdge,
    link: MasterSlaveLink,
}

impl SoloState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit flag alone, without masters.
    pub fn explicit_solo(&self) -> bool {
        self.self_solo
    }

    /// Soloed by this channel's own controls: the explicit flag or an
    /// engaged solo master. This is the value upstream pushes key off.
    pub fn self_soloed(&self) -> bool {
        self.self_solo || self.link.engaged_count() > 0
    }

    /// Soloed because of other channels' solo state, via propagation.
    pub fn soloed_by_others(&self) -> bool {
        self.by_upstream > 0 || self.by_downstream > 0
    }

    /// Overall soloed value.
    pub fn soloed(&self) -> bool {
        self.self_soloed() || self.soloed_by_others()
    }

    pub fn by_others_upstream(&self) -> u32 {
        self.by_upstream
    }

    pub fn by_others_downstream(&self) -> u32 {
        self.by_downstream
    }

    /// Boundary marker of the most recent mutation.
    pub fn transition(&self) -> SoloTransition {
        self.transition
    }

    /// Set the explicit solo flag. Returns true when the call changed
    /// externally observable solo status (flag or overall value); a
    /// repeated identical call changes nothing and marks no transition.
    pub fn set_self_solo(&mut self, yn: bool) -> bool {
        if self.self_solo == yn {
            self.transition = SoloTransition::None;
            return false;
        }
        let before = self.soloed();
        self.self_solo = yn;
        self.transition = SoloTransition::from_edge(before, self.soloed());
        true
    }

    /// Adjust the soloed-by-others count pushed from channels this one
    /// feeds. Negative deltas clamp at zero. Returns true only when the
    /// overall soloed value crossed its boundary.
    pub fn mod_by_others_upstream(&mut self, delta: i32) -> bool {
        let before = self.soloed();
        self.by_upstream = mod_counter(self.by_upstream, delta, "solo by-others-upstream");
        self.transition = SoloTransition::from_edge(before, self.soloed());
        self.transition != SoloTransition::None
    }

    /// Adjust the soloed-by-others count replayed from graph changes on
    /// the feeding side. Negative deltas clamp at zero.
    pub fn mod_by_others_downstream(&mut self, delta: i32) -> bool {
        let before = self.soloed();
        self.by_downstream = mod_counter(self.by_downstream, delta, "solo by-others-downstream");
        self.transition = SoloTransition::from_edge(before, self.soloed());
        self.transition != SoloTransition::None
    }

    /// Clear the explicit flag and both counters (session-wide cancel).
    /// Returns true when the channel was observably soloed before.
    pub fn clear_all_solo_state(&mut self) -> bool {
        let before = self.soloed();
        self.self_solo = false;
        self.by_upstream = 0;
        self.by_downstream = 0;
        self.transition = SoloTransition::from_edge(before, self.soloed());
        before != self.soloed()
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

    /// Attach a solo master with its current engagement.
    /// Returns true on an externally observable change.
    pub fn add_master(&mut self, handle: MasterHandle, engaged_now: bool) -> bool {
        let before = self.soloed();
        if !self.link.add_master(handle, engaged_now, &mut self.edge) {
            self.transition = SoloTransition::None;
            return false;
        }
        self.edge.take();
        self.transition = SoloTransition::from_edge(before, self.soloed());
        self.transition != SoloTransition::None
    }

    /// Detach a master (all when `None`). The observable value must not
    /// change from losing a master alone: when the link disengages while
    /// the aggregate was carrying the solo, the value is folded into the
    /// explicit flag and re-asserted.
    pub fn remove_master(&mut self, handle: Option<MasterHandle>) -> usize {
        let was_self = self.self_soloed();
        let n = self.link.remove_master(handle, &mut self.edge);
        if self.edge.take() == LinkTransition::Disengaged && was_self && !self.self_soloed() {
            self.self_solo = true;
        }
        self.transition = SoloTransition::None;
        n
    }

    /// A solo master's value changed. Returns true on an externally
    /// observable change of this channel's solo status.
    pub fn master_changed(&mut self, handle: MasterHandle, engaged_now: bool) -> bool {
        let before = self.soloed();
        self.link.master_changed(handle, engaged_now);
        self.transition = SoloTransition::from_edge(before, self.soloed());
        self.transition != SoloTransition::None
    }

    /// Drop master handles whose channel no longer resolves.
    pub fn prune_masters<F: Fn(MasterHandle) -> bool>(&mut self, alive: F) -> usize {
        self.link.prune(alive)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
