//! Session: channel arena, propagation, audibility resolution
//!
//! All mutation happens here, single-threaded, at the render cycle's
//! mutation slot (or directly when embedded without a render thread).
//! The rules:
//! - Solo transitions push one hop per hard edge to the channels feeding
//!   the transitioning channel; receivers do not re-propagate.
//! - Graph edge changes replay counter deltas through the same `mod_*`
//!   API live transitions use.
//! - Master/slave engagement fans out through the reverse link map,
//!   cascading only while observable values actually flip.
//! - Every externally visible transition emits exactly one signal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fw_core::{ChannelId, ChannelKind, ControlKind, FwError, FwResult, GroupDisposition, MasterHandle};
use fw_control::{
    AutomationMode, ControlCurve, IsolateTransition, MutePoint, MutePointMask, SoloTransition,
};
use fw_graph::{GraphError, RoutingGraph};

use crate::channel::Channel;
use crate::config::SessionConfig;
use crate::coordinator::SoloSnapshot;
use crate::signal::{SessionMirror, SessionSignal};

/// Session-owned control state for every channel in the mix
pub struct Session {
    config: SessionConfig,
    channels: HashMap<ChannelId, Channel>,
    graph: RoutingGraph,
    processing_order: Vec<ChannelId>,
    /// Reverse link map: master handle -> channels slaved to it
    slaves_of: HashMap<MasterHandle, HashSet<ChannelId>>,
    next_id: AtomicU32,
    /// Channels currently soloed overall, maintained incrementally from
    /// the per-channel transition markers
    soloed_count: u32,
    solo_active: bool,
    pub(crate) momentary: Option<SoloSnapshot>,
    pending: Vec<SessionSignal>,
    mirror: Arc<SessionMirror>,
}

impl Session {
    /// Create a session with its master channel (always ID 0).
    pub fn new(config: SessionConfig) -> Self {
        let mut channels = HashMap::new();
        let mut graph = RoutingGraph::new();
        let master = Channel::new(
            ChannelId::MASTER,
            ChannelKind::Master,
            "Master",
            config.default_mute_points,
        );
        channels.insert(ChannelId::MASTER, master);
        graph.add_channel(ChannelId::MASTER);

        Self {
            config,
            channels,
            graph,
            processing_order: vec![ChannelId::MASTER],
            slaves_of: HashMap::new(),
            next_id: AtomicU32::new(1),
            soloed_count: 0,
            solo_active: false,
            momentary: None,
            pending: Vec::with_capacity(64),
            mirror: Arc::new(SessionMirror::default()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // ACCESS
    // ═══════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = config;
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.channels.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn graph(&self) -> &RoutingGraph {
        &self.graph
    }

    /// Load-path access: edges restored from a document are added
    /// directly, with counter replay handled by the document itself.
    pub(crate) fn graph_mut(&mut self) -> &mut RoutingGraph {
        &mut self.graph
    }

    /// Current topological processing order (total, possibly degraded).
    pub fn processing_order(&self) -> &[ChannelId] {
        &self.processing_order
    }

    pub fn solo_active(&self) -> bool {
        self.solo_active
    }

    pub fn mirror(&self) -> Arc<SessionMirror> {
        Arc::clone(&self.mirror)
    }

    /// Drain signals accumulated since the last call.
    pub fn take_signals(&mut self) -> Vec<SessionSignal> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn signal(&mut self, sig: SessionSignal) {
        self.pending.push(sig);
    }

    // ═══════════════════════════════════════════════════════════════════
    // CHANNEL LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════

    /// Create a new channel.
    pub fn create_channel(&mut self, kind: ChannelKind, name: Option<&str>) -> ChannelId {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let auto_name = name
            .map(String::from)
            .unwrap_or_else(|| format!("{} {}", kind.prefix(), id.0));
        let channel = Channel::new(id, kind, &auto_name, self.config.default_mute_points);
        self.channels.insert(id, channel);
        self.graph.add_channel(id);
        self.mirror.set_channel_count(self.channels.len() as u32 - 1);
        self.republish_order();
        id
    }

    /// Re-insert a channel with a known id (session load path).
    pub(crate) fn restore_channel(&mut self, id: ChannelId, kind: ChannelKind, name: &str) {
        let channel = Channel::new(id, kind, name, self.config.default_mute_points);
        self.channels.insert(id, channel);
        self.graph.add_channel(id);
        self.next_id.fetch_max(id.0 + 1, Ordering::Relaxed);
        self.mirror.set_channel_count(self.channels.len() as u32 - 1);
    }

    /// Remove a channel: reverse its solo/isolate contributions, detach
    /// every edge with delta replay, and unlink all master/slave
    /// relations in both directions so no stale handles accumulate.
    pub fn remove_channel(&mut self, id: ChannelId) -> FwResult<()> {
        if !self.channels.contains_key(&id) {
            return Err(FwError::ChannelNotFound(id));
        }
        if id.is_master() {
            return Err(FwError::State("cannot remove the master channel".into()));
        }

        // Back out this channel's own contributions while its edges are
        // still in place, then detach the edges themselves.
        self.apply_self_solo(id, false);
        self.set_isolated(id, false, GroupDisposition::NoGroup)?;

        let incoming: Vec<ChannelId> = self.graph.feeders_of(id).collect();
        let outgoing: Vec<ChannelId> = self.graph.edges_from(id).collect();
        for from in incoming {
            self.detach_edge(from, id);
        }
        for to in outgoing {
            self.detach_edge(id, to);
        }

        // Channel leaving while still observably soloed (by-others
        // counters): keep the session-wide bookkeeping consistent.
        if self.channels.get(&id).is_some_and(|c| c.solo.soloed()) {
            self.note_solo_transition(SoloTransition::OutOfSolo);
        }

        self.unlink_all_masters(id);
        self.graph.remove_channel(id);
        self.channels.remove(&id);
        self.mirror.set_channel_count(self.channels.len() as u32 - 1);
        self.republish_order();
        self.signal(SessionSignal::ChannelRemoved(id));
        Ok(())
    }

    fn unlink_all_masters(&mut self, id: ChannelId) {
        // As a slave: deregister from every master's reverse entry.
        if let Some(ch) = self.channels.get(&id) {
            let handles: Vec<MasterHandle> =
                ch.solo.masters().chain(ch.mute.masters()).collect();
            for handle in handles {
                if let Some(slaves) = self.slaves_of.get_mut(&handle) {
                    slaves.remove(&id);
                }
            }
        }

        // As a master: detach from every slave, preserving their
        // observable values per the aggregation contract.
        for kind in [ControlKind::Solo, ControlKind::Mute] {
            let handle = MasterHandle::new(id, kind);
            let Some(slaves) = self.slaves_of.remove(&handle) else {
                continue;
            };
            for sid in slaves {
                let Some(ch) = self.channels.get_mut(&sid) else {
                    continue;
                };
                match kind {
                    ControlKind::Solo => {
                        ch.solo.remove_master(Some(handle));
                    }
                    ControlKind::Mute => {
                        ch.mute.remove_master(Some(handle));
                    }
                    _ => {}
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // ROUTING
    // ═══════════════════════════════════════════════════════════════════

    /// Connect `from` into `to`. Counter deltas for any solo/isolate
    /// state already engaged on either endpoint are replayed through the
    /// incremental API, and the processing order is republished.
    pub fn connect(&mut self, from: ChannelId, to: ChannelId, via_send_only: bool) -> FwResult<()> {
        self.graph
            .add(from, to, via_send_only)
            .map_err(graph_error)?;
        if !via_send_only {
            self.replay_edge_deltas(from, to, 1);
        }
        self.republish_order();
        Ok(())
    }

    /// Remove the `from` -> `to` connection.
    pub fn disconnect(&mut self, from: ChannelId, to: ChannelId) -> FwResult<()> {
        if !self.detach_edge(from, to) {
            return Err(FwError::State(format!(
                "no route {:?} -> {:?}",
                from, to
            )));
        }
        self.republish_order();
        Ok(())
    }

    fn detach_edge(&mut self, from: ChannelId, to: ChannelId) -> bool {
        // Capture pre-removal state: the replay mirrors what the edge was
        // contributing while it existed.
        let Some(edge) = self.graph.remove(from, to) else {
            return false;
        };
        if !edge.via_send_only {
            self.replay_edge_deltas(from, to, -1);
        }
        true
    }

    /// Delta replay for one hard edge appearing (`sign` = 1) or
    /// disappearing (`sign` = -1). A removal whose matching increment was
    /// never observed clamps at zero inside the counters.
    fn replay_edge_deltas(&mut self, from: ChannelId, to: ChannelId, sign: i32) {
        let to_soloed = self.channels.get(&to).is_some_and(|c| c.solo.soloed());
        let from_soloed = self.channels.get(&from).is_some_and(|c| c.solo.soloed());
        let from_isolated = self
            .channels
            .get(&from)
            .is_some_and(|c| c.isolate.solo_isolated());

        if to_soloed {
            self.apply_upstream_delta(from, sign);
        }
        if from_soloed
            && let Some(ch) = self.channels.get_mut(&to)
            && ch.kind.can_solo()
        {
            let crossed = ch.solo.mod_by_others_downstream(sign);
            let transition = ch.solo.transition();
            self.note_solo_transition(transition);
            if crossed {
                self.signal(SessionSignal::SoloChanged(to));
            }
        }
        if from_isolated
            && let Some(ch) = self.channels.get_mut(&to)
            && ch.kind.can_solo()
            && ch.isolate.mod_isolated_by_upstream(sign)
        {
            self.signal(SessionSignal::IsolateChanged(to));
        }
    }

    pub(crate) fn republish_order(&mut self) {
        let report = self.graph.resort();
        // Replaced wholesale at the mutation slot: the render thread
        // never observes a partially updated order.
        self.processing_order = report.order;
        self.mirror.set_graph_degraded(self.graph.is_degraded());
        if report.feedback_detected {
            self.signal(SessionSignal::FeedbackDetected);
        }
        if report.recovered {
            self.signal(SessionSignal::GraphSorted);
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // SOLO
    // ═══════════════════════════════════════════════════════════════════

    /// Set a channel's explicit solo flag. In exclusive mode (or with
    /// non-latched solo), engaging one channel first clears every other
    /// explicit solo.
    pub fn set_self_solo(
        &mut self,
        id: ChannelId,
        yn: bool,
        _disposition: GroupDisposition,
    ) -> FwResult<()> {
        if !self.channels.contains_key(&id) {
            return Err(FwError::ChannelNotFound(id));
        }
        if yn && (self.config.exclusive_solo || !self.config.latched_solo) {
            let others: Vec<ChannelId> = self
                .channels
                .iter()
                .filter(|&(&cid, ref ch)| cid != id && ch.solo.explicit_solo())
                .map(|(&cid, _)| cid)
                .collect();
            for other in others {
                self.apply_self_solo(other, false);
            }
        }
        self.apply_self_solo(id, yn);
        Ok(())
    }

    /// Raw flag application plus propagation; shared by the exclusive
    /// sweep, the coordinator, and snapshot restore (which must not
    /// re-enter the exclusive sweep).
    pub(crate) fn apply_self_solo(&mut self, id: ChannelId, yn: bool) {
        let Some(ch) = self.channels.get_mut(&id) else {
            return;
        };
        if !ch.kind.can_solo() {
            return;
        }
        let was_self = ch.solo.self_soloed();
        let observable = ch.solo.set_self_solo(yn);
        self.finish_solo_change(id, was_self, observable);
    }

    /// Common tail of every solo mutation: session bookkeeping, signal,
    /// one-hop upstream push, and master fan-out to slaved channels.
    fn finish_solo_change(&mut self, id: ChannelId, was_self: bool, observable: bool) {
        let Some(ch) = self.channels.get(&id) else {
            return;
        };
        let transition = ch.solo.transition();
        let now_self = ch.solo.self_soloed();
        let push_gate = ch.solo.by_others_downstream() == 0;
        self.note_solo_transition(transition);
        if observable {
            self.signal(SessionSignal::SoloChanged(id));
        }
        if was_self != now_self {
            // Push only on the self-solo boundary, and only while not
            // already carried by a soloed channel this one feeds.
            if push_gate {
                self.push_solo_upstream(id, if now_self { 1 } else { -1 });
            }
            self.fan_out_master_change(MasterHandle::solo(id), now_self);
        }
    }

    /// One hop per hard edge: every channel feeding `id` gains or loses
    /// one soloed-by-others contribution. Receivers do not re-propagate.
    fn push_solo_upstream(&mut self, id: ChannelId, delta: i32) {
        let feeders: Vec<ChannelId> = self.graph.hard_feeders_of(id).collect();
        for from in feeders {
            self.apply_upstream_delta(from, delta);
        }
    }

    fn apply_upstream_delta(&mut self, id: ChannelId, delta: i32) {
        let Some(ch) = self.channels.get_mut(&id) else {
            return;
        };
        if !ch.kind.can_solo() {
            return;
        }
        let crossed = ch.solo.mod_by_others_upstream(delta);
        let transition = ch.solo.transition();
        self.note_solo_transition(transition);
        if crossed {
            self.signal(SessionSignal::SoloChanged(id));
        }
    }

    /// Fold a channel's overall-soloed boundary into the session-wide
    /// bookkeeping; fires SoloActive on its own edges only.
    pub(crate) fn note_solo_transition(&mut self, transition: SoloTransition) {
        match transition {
            SoloTransition::IntoSolo => self.soloed_count += 1,
            SoloTransition::OutOfSolo => {
                self.soloed_count = self.soloed_count.saturating_sub(1)
            }
            SoloTransition::None => return,
        }
        self.refresh_solo_active();
    }

    pub(crate) fn refresh_solo_active(&mut self) {
        let active = self.soloed_count > 0;
        if active != self.solo_active {
            self.solo_active = active;
            self.mirror.set_solo_active(active);
            self.signal(SessionSignal::SoloActive(active));
        }
    }

    pub(crate) fn set_soloed_count(&mut self, count: u32) {
        self.soloed_count = count;
    }

    // ═══════════════════════════════════════════════════════════════════
    // MUTE
    // ═══════════════════════════════════════════════════════════════════

    /// Set a channel's explicit mute flag. Ordering contract: state
    /// mutation, then the hush action, then the Changed signal.
    pub fn set_self_mute(
        &mut self,
        id: ChannelId,
        yn: bool,
        _disposition: GroupDisposition,
    ) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&id)
            .ok_or(FwError::ChannelNotFound(id))?;
        let before = ch.mute.muted();
        let mut hushed = false;
        let observable = ch.mute.actually_set_mute(yn, |muted| hushed = muted);
        if hushed {
            // Hush immediately rather than waiting for the next resolve
            // pass; listeners of the Changed signal see final state.
            for point in MutePoint::ALL {
                let gain = ch.mute.mute_gain_at(point);
                ch.set_resolved_gain(point, gain);
            }
        }
        let now = ch.mute.muted();
        if observable {
            self.signal(SessionSignal::MuteChanged(id));
        }
        if before != now {
            self.fan_out_master_change(MasterHandle::mute(id), now);
        }
        Ok(())
    }

    pub fn set_mute_points(&mut self, id: ChannelId, mask: MutePointMask) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&id)
            .ok_or(FwError::ChannelNotFound(id))?;
        if ch.mute.set_mute_points(mask) && ch.mute.muted() {
            self.signal(SessionSignal::MuteChanged(id));
        }
        Ok(())
    }

    pub fn set_mute_automation(&mut self, id: ChannelId, mode: AutomationMode) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&id)
            .ok_or(FwError::ChannelNotFound(id))?;
        ch.mute.set_automation_mode(mode);
        Ok(())
    }

    /// Swap in an edited mute automation curve.
    pub fn set_mute_curve(&mut self, id: ChannelId, curve: ControlCurve) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&id)
            .ok_or(FwError::ChannelNotFound(id))?;
        ch.mute.set_curve(curve);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // ISOLATE / SAFE
    // ═══════════════════════════════════════════════════════════════════

    /// Set a channel's explicit solo-isolate flag; the overall boundary
    /// pushes one hop downstream over hard edges.
    pub fn set_isolated(
        &mut self,
        id: ChannelId,
        yn: bool,
        _disposition: GroupDisposition,
    ) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&id)
            .ok_or(FwError::ChannelNotFound(id))?;
        let changed = ch.isolate.set_isolated(yn);
        let transition = ch.isolate.transition();
        if changed {
            self.signal(SessionSignal::IsolateChanged(id));
        }
        match transition {
            IsolateTransition::IntoIsolated => self.push_isolate_downstream(id, 1),
            IsolateTransition::OutOfIsolated => self.push_isolate_downstream(id, -1),
            IsolateTransition::None => {}
        }
        Ok(())
    }

    fn push_isolate_downstream(&mut self, id: ChannelId, delta: i32) {
        let targets: Vec<ChannelId> = self.graph.hard_targets_of(id).collect();
        for to in targets {
            let Some(ch) = self.channels.get_mut(&to) else {
                continue;
            };
            if !ch.kind.can_solo() {
                continue;
            }
            if ch.isolate.mod_isolated_by_upstream(delta) {
                self.signal(SessionSignal::IsolateChanged(to));
            }
        }
    }

    pub fn set_safe(
        &mut self,
        id: ChannelId,
        yn: bool,
        _disposition: GroupDisposition,
    ) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&id)
            .ok_or(FwError::ChannelNotFound(id))?;
        if ch.safe.set_safe(yn) {
            self.signal(SessionSignal::SafeChanged(id));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // MASTER/SLAVE LINKS
    // ═══════════════════════════════════════════════════════════════════

    /// Slave a channel's control to a master control of the same kind.
    pub fn add_master_link(&mut self, slave: ChannelId, master: MasterHandle) -> FwResult<()> {
        if !self.channels.contains_key(&slave) {
            return Err(FwError::ChannelNotFound(slave));
        }
        if !self.channels.contains_key(&master.channel) {
            return Err(FwError::ChannelNotFound(master.channel));
        }
        if master.channel == slave {
            return Err(FwError::SelfReference(slave));
        }
        let engaged = self.control_engaged(master).unwrap_or(false);
        match master.kind {
            ControlKind::Solo => {
                let Some(ch) = self.channels.get_mut(&slave) else {
                    return Err(FwError::ChannelNotFound(slave));
                };
                if ch.solo.has_master(master) {
                    return Ok(()); // already linked
                }
                let was_self = ch.solo.self_soloed();
                let observable = ch.solo.add_master(master, engaged);
                self.slaves_of.entry(master).or_default().insert(slave);
                self.finish_solo_change(slave, was_self, observable);
            }
            ControlKind::Mute => {
                let Some(ch) = self.channels.get_mut(&slave) else {
                    return Err(FwError::ChannelNotFound(slave));
                };
                if ch.mute.has_master(master) {
                    return Ok(());
                }
                let before = ch.mute.muted();
                let observable = ch.mute.add_master(master, engaged);
                let now = ch.mute.muted();
                self.slaves_of.entry(master).or_default().insert(slave);
                if observable {
                    self.signal(SessionSignal::MuteChanged(slave));
                }
                if before != now {
                    self.fan_out_master_change(MasterHandle::mute(slave), now);
                }
            }
            other => {
                return Err(FwError::State(format!(
                    "control kind {:?} is not slavable in the mix-control layer",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Unlink a specific master, or all masters of `kind` when `None`.
    /// The slave's observable value is preserved across the removal.
    pub fn remove_master_link(
        &mut self,
        slave: ChannelId,
        kind: ControlKind,
        master: Option<MasterHandle>,
    ) -> FwResult<()> {
        let ch = self
            .channels
            .get_mut(&slave)
            .ok_or(FwError::ChannelNotFound(slave))?;
        let removed: Vec<MasterHandle> = match kind {
            ControlKind::Solo => {
                let handles: Vec<MasterHandle> = match master {
                    Some(h) if ch.solo.has_master(h) => vec![h],
                    Some(_) => Vec::new(),
                    None => ch.solo.masters().collect(),
                };
                ch.solo.remove_master(master);
                handles
            }
            ControlKind::Mute => {
                let handles: Vec<MasterHandle> = match master {
                    Some(h) if ch.mute.has_master(h) => vec![h],
                    Some(_) => Vec::new(),
                    None => ch.mute.masters().collect(),
                };
                ch.mute.remove_master(master);
                handles
            }
            other => {
                return Err(FwError::State(format!(
                    "control kind {:?} is not slavable in the mix-control layer",
                    other
                )));
            }
        };
        for handle in removed {
            if let Some(slaves) = self.slaves_of.get_mut(&handle) {
                slaves.remove(&slave);
            }
        }
        Ok(())
    }

    /// Load-path link restore: attach without propagation or signals.
    /// Engagement starts false; `catch_up_master_links` re-derives it
    /// once every master's own flags are in place.
    pub(crate) fn add_master_link_quiet(&mut self, slave: ChannelId, master: MasterHandle) {
        let Some(ch) = self.channels.get_mut(&slave) else {
            return;
        };
        let registered = match master.kind {
            ControlKind::Solo => {
                ch.solo.add_master(master, false);
                ch.solo.has_master(master)
            }
            ControlKind::Mute => {
                ch.mute.add_master(master, false);
                ch.mute.has_master(master)
            }
            _ => false,
        };
        if registered {
            self.slaves_of.entry(master).or_default().insert(slave);
        }
    }

    /// Re-derive every link's engagement from the current arena state.
    /// Resolution-order independent: runs after all flags are restored.
    pub(crate) fn catch_up_master_links(&mut self) {
        let handles: Vec<MasterHandle> = self.slaves_of.keys().copied().collect();
        for handle in handles {
            let engaged = self.control_engaged(handle).unwrap_or(false);
            let slaves: Vec<ChannelId> = self
                .slaves_of
                .get(&handle)
                .map(|s| s.iter().copied().collect())
                .unwrap_or_default();
            for sid in slaves {
                let Some(ch) = self.channels.get_mut(&sid) else {
                    continue;
                };
                match handle.kind {
                    ControlKind::Solo => {
                        ch.solo.master_changed(handle, engaged);
                    }
                    ControlKind::Mute => {
                        ch.mute.master_changed(handle, engaged);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Current engagement of a master control. A handle whose channel is
    /// gone resolves to `None`: "no master", never an error.
    pub fn control_engaged(&self, handle: MasterHandle) -> Option<bool> {
        let ch = self.channels.get(&handle.channel)?;
        match handle.kind {
            ControlKind::Solo => Some(ch.solo.self_soloed()),
            ControlKind::Mute => Some(ch.mute.muted()),
            ControlKind::SoloIsolate => Some(ch.isolate.solo_isolated()),
            ControlKind::SoloSafe => Some(ch.safe.is_safe()),
            ControlKind::Gain => None,
        }
    }

    /// Cascade an engagement change through the reverse link map. Stops
    /// where observable values stop flipping, so linked cycles (a VCA
    /// slaved back to itself through another) terminate.
    pub(crate) fn fan_out_master_change(&mut self, handle: MasterHandle, engaged_now: bool) {
        let Some(slaves) = self.slaves_of.get(&handle) else {
            return;
        };
        let slaves: Vec<ChannelId> = slaves.iter().copied().collect();
        for sid in slaves {
            match handle.kind {
                ControlKind::Solo => {
                    let Some(ch) = self.channels.get_mut(&sid) else {
                        continue;
                    };
                    let was_self = ch.solo.self_soloed();
                    let observable = ch.solo.master_changed(handle, engaged_now);
                    self.finish_solo_change(sid, was_self, observable);
                }
                ControlKind::Mute => {
                    let Some(ch) = self.channels.get_mut(&sid) else {
                        continue;
                    };
                    let before = ch.mute.muted();
                    let observable = ch.mute.master_changed(handle, engaged_now);
                    let now = ch.mute.muted();
                    if observable {
                        self.signal(SessionSignal::MuteChanged(sid));
                    }
                    if before != now {
                        self.fan_out_master_change(MasterHandle::mute(sid), now);
                    }
                }
                _ => {}
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // AUDIBILITY RESOLUTION
    // ═══════════════════════════════════════════════════════════════════

    /// Resolve every channel's per-point gain for the coming block. Runs
    /// at the mutation slot; the render path afterwards only reads the
    /// cached values.
    pub fn resolve_audibility(&mut self, transport_pos: u64) {
        let solo_active = self.solo_active;
        let overrides = self.config.solo_overrides_mute;
        for ch in self.channels.values_mut() {
            let soloed = ch.solo.soloed();
            let self_soloed = ch.solo.self_soloed();
            let by_others = ch.solo.soloed_by_others();
            let isolated = ch.isolate.solo_isolated();
            let safe = ch.safe.is_safe();
            let muted_by_others_soloing = solo_active
                && !soloed
                && !isolated
                && !safe
                && ch.kind.can_be_muted_by_others();
            ch.mute.sync_solo_context(
                self_soloed,
                by_others,
                muted_by_others_soloing,
                safe,
                overrides,
            );
            for point in MutePoint::ALL {
                let gain = ch.mute.rt_gain_at(point, transport_pos);
                ch.set_resolved_gain(point, gain);
            }
        }
    }
}

fn graph_error(e: GraphError) -> FwError {
    match e {
        GraphError::SelfReference(id) => FwError::SelfReference(id),
        GraphError::UnknownChannel(id) => FwError::ChannelNotFound(id),
        GraphError::DuplicateEdge { from, to } => FwError::DuplicateRoute { from, to },
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
