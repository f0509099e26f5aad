//! Master/slave control aggregation
//!
//! Any control may be slaved to zero or more master controls (a VCA's
//! mute over its member tracks, a VCA slaved to another VCA, and so on).
//! The link caches the number of currently engaged masters so that the
//! aggregate is an O(1) read; the count is maintained incrementally on
//! add/remove/master-value-change, never by rescanning the master list.
//!
//! Masters are addressed as `(channel, control kind)` handles into the
//! session arena. A handle whose channel has been destroyed resolves to
//! "absent": it contributes nothing and is pruned on the next maintenance
//! pass, so there is nothing to dangle.

use fw_core::MasterHandle;

// ═══════════════════════════════════════════════════════════════════════════
// HOOKS
// ═══════════════════════════════════════════════════════════════════════════

/// Edge-notification hooks around link mutation.
///
/// `after_add` and `before_remove` run with the pre-mutation engaged
/// count still visible, so a caller can detect a 0 -> 1 or 1 -> 0
/// transition of the aggregate directly instead of re-deriving it.
pub trait LinkHooks {
    fn before_add(&mut self, _pre_engaged: u32) {}
    fn after_add(&mut self, _pre_engaged: u32, _post_engaged: u32) {}
    fn before_remove(&mut self, _pre_engaged: u32, _post_engaged: u32) {}
}

/// No-op hook sink
pub struct NoHooks;

impl LinkHooks for NoHooks {}

/// Aggregate engagement transition of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkTransition {
    #[default]
    None,
    /// Engaged count crossed 0 -> nonzero
    Engaged,
    /// Engaged count crossed nonzero -> 0
    Disengaged,
}

/// Standard hook sink: records the engagement edge of the last mutation.
/// Controls embed one of these next to their link so the link can borrow
/// it independently of the rest of the control state.
#[derive(Debug, Default)]
pub struct EngagedEdge {
    transition: LinkTransition,
}

impl LinkHooks for EngagedEdge {
    fn after_add(&mut self, pre_engaged: u32, post_engaged: u32) {
        if pre_engaged == 0 && post_engaged > 0 {
            self.transition = LinkTransition::Engaged;
        }
    }

    fn before_remove(&mut self, pre_engaged: u32, post_engaged: u32) {
        if pre_engaged > 0 && post_engaged == 0 {
            self.transition = LinkTransition::Disengaged;
        }
    }
}

impl EngagedEdge {
    /// Consume the recorded transition.
    pub fn take(&mut self) -> LinkTransition {
        std::mem::take(&mut self.transition)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MASTER/SLAVE LINK
// ═══════════════════════════════════════════════════════════════════════════

/// One attached master and its last known engagement.
#[derive(Debug, Clone, Copy)]
struct MasterRecord {
    handle: MasterHandle,
    engaged: bool,
}

/// N:M aggregation primitive: an ordered set of masters plus the cached
/// count of those currently engaged.
#[derive(Debug, Default)]
pub struct MasterSlaveLink {
    records: Vec<MasterRecord>,
    engaged: u32,
}

impl MasterSlaveLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of masters currently engaged ("on" for boolean masters).
    pub fn engaged_count(&self) -> u32 {
        self.engaged
    }

    /// Number of attached masters, engaged or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, handle: MasterHandle) -> bool {
        self.records.iter().any(|r| r.handle == handle)
    }

    /// Attached master handles, in attachment order.
    pub fn masters(&self) -> impl Iterator<Item = MasterHandle> + '_ {
        self.records.iter().map(|r| r.handle)
    }

    /// Attach a master. `engaged_now` is the master's current value as
    /// resolved by the caller. Returns false if already attached.
    pub fn add_master<H: LinkHooks>(
        &mut self,
        handle: MasterHandle,
        engaged_now: bool,
        hooks: &mut H,
    ) -> bool {
        if self.contains(handle) {
            return false;
        }
        let pre = self.engaged;
        hooks.before_add(pre);
        self.records.push(MasterRecord {
            handle,
            engaged: engaged_now,
        });
        if engaged_now {
            self.engaged += 1;
        }
        hooks.after_add(pre, self.engaged);
        true
    }

    /// Detach a master, or all masters when `handle` is `None`.
    /// Returns the number detached.
    pub fn remove_master<H: LinkHooks>(
        &mut self,
        handle: Option<MasterHandle>,
        hooks: &mut H,
    ) -> usize {
        match handle {
            Some(handle) => {
                let Some(idx) = self.records.iter().position(|r| r.handle == handle) else {
                    return 0;
                };
                let pre = self.engaged;
                let post = if self.records[idx].engaged {
                    pre.saturating_sub(1)
                } else {
                    pre
                };
                hooks.before_remove(pre, post);
                self.records.remove(idx);
                self.engaged = post;
                1
            }
            None => {
                if self.records.is_empty() {
                    return 0;
                }
                let pre = self.engaged;
                hooks.before_remove(pre, 0);
                let n = self.records.len();
                self.records.clear();
                self.engaged = 0;
                n
            }
        }
    }

    /// A master's value changed. Updates the cached count incrementally
    /// and reports the aggregate transition, if any. Unknown handles and
    /// repeated notifications of the same value are no-ops.
    pub fn master_changed(&mut self, handle: MasterHandle, engaged_now: bool) -> LinkTransition {
        let Some(record) = self.records.iter_mut().find(|r| r.handle == handle) else {
            return LinkTransition::None;
        };
        if record.engaged == engaged_now {
            return LinkTransition::None;
        }
        record.engaged = engaged_now;
        let pre = self.engaged;
        self.engaged = if engaged_now {
            pre + 1
        } else {
            pre.saturating_sub(1)
        };
        match (pre, self.engaged) {
            (0, post) if post > 0 => LinkTransition::Engaged,
            (pre, 0) if pre > 0 => LinkTransition::Disengaged,
            _ => LinkTransition::None,
        }
    }

    /// Drop handles whose channel no longer resolves. Maintenance only;
    /// never called from the render path.
    pub fn prune<F: Fn(MasterHandle) -> bool>(&mut self, alive: F) -> usize {
        let before = self.records.len();
        let mut dropped_engaged = 0u32;
        self.records.retain(|r| {
            let keep = alive(r.handle);
            if !keep && r.engaged {
                dropped_engaged += 1;
            }
            keep
        });
        self.engaged = self.engaged.saturating_sub(dropped_engaged);
        let dropped = before - self.records.len();
        if dropped > 0 {
            log::debug!("pruned {} dangling master handle(s)", dropped);
        }
        dropped
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::{ChannelId, ControlKind};

    fn handle(n: u32) -> MasterHandle {
        MasterHandle::new(ChannelId(n), ControlKind::Mute)
    }

    #[test]
    fn test_engaged_count_incremental() {
        let mut link = MasterSlaveLink::new();
        let mut edge = EngagedEdge::default();

        link.add_master(handle(1), false, &mut edge);
        assert_eq!(link.engaged_count(), 0);
        assert_eq!(edge.take(), LinkTransition::None);

        link.add_master(handle(2), true, &mut edge);
        assert_eq!(link.engaged_count(), 1);
        assert_eq!(edge.take(), LinkTransition::Engaged);

        assert_eq!(link.master_changed(handle(1), true), LinkTransition::None);
        assert_eq!(link.engaged_count(), 2);

        assert_eq!(link.master_changed(handle(2), false), LinkTransition::None);
        assert_eq!(link.master_changed(handle(1), false), LinkTransition::Disengaged);
        assert_eq!(link.engaged_count(), 0);
    }

    #[test]
    fn test_master_changed_idempotent() {
        let mut link = MasterSlaveLink::new();
        link.add_master(handle(1), true, &mut NoHooks);
        // Same value notified twice: count must not drift.
        assert_eq!(link.master_changed(handle(1), true), LinkTransition::None);
        assert_eq!(link.engaged_count(), 1);
    }

    #[test]
    fn test_duplicate_add_ignored() {
        let mut link = MasterSlaveLink::new();
        assert!(link.add_master(handle(1), true, &mut NoHooks));
        assert!(!link.add_master(handle(1), true, &mut NoHooks));
        assert_eq!(link.engaged_count(), 1);
        assert_eq!(link.len(), 1);
    }

    #[test]
    fn test_remove_specific_and_all() {
        let mut link = MasterSlaveLink::new();
        let mut edge = EngagedEdge::default();
        link.add_master(handle(1), true, &mut NoHooks);
        link.add_master(handle(2), true, &mut NoHooks);

        assert_eq!(link.remove_master(Some(handle(1)), &mut edge), 1);
        // 2 -> 1 engaged: no aggregate edge.
        assert_eq!(edge.take(), LinkTransition::None);
        assert_eq!(link.engaged_count(), 1);

        assert_eq!(link.remove_master(None, &mut edge), 1);
        assert_eq!(edge.take(), LinkTransition::Disengaged);
        assert_eq!(link.engaged_count(), 0);
        assert!(link.is_empty());
    }

    #[test]
    fn test_hooks_see_pre_mutation_count() {
        struct Probe {
            seen: Vec<(u32, u32)>,
        }
        impl LinkHooks for Probe {
            fn after_add(&mut self, pre: u32, post: u32) {
                self.seen.push((pre, post));
            }
            fn before_remove(&mut self, pre: u32, post: u32) {
                self.seen.push((pre, post));
            }
        }

        let mut link = MasterSlaveLink::new();
        let mut probe = Probe { seen: Vec::new() };
        link.add_master(handle(1), true, &mut probe);
        link.add_master(handle(2), true, &mut probe);
        link.remove_master(Some(handle(1)), &mut probe);
        assert_eq!(probe.seen, vec![(0, 1), (1, 2), (2, 1)]);
    }

    #[test]
    fn test_prune_dangling() {
        let mut link = MasterSlaveLink::new();
        link.add_master(handle(1), true, &mut NoHooks);
        link.add_master(handle(2), true, &mut NoHooks);
        link.add_master(handle(3), false, &mut NoHooks);

        let dropped = link.prune(|h| h.channel != ChannelId(2));
        assert_eq!(dropped, 1);
        assert_eq!(link.len(), 2);
        assert_eq!(link.engaged_count(), 1);
    }
}
