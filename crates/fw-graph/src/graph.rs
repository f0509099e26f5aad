//! Routing graph
//!
//! Owns the wiring between channels and nothing else: no control state,
//! no audio buffers. Answers adjacency queries and produces the
//! topological processing order.
//!
//! ## Edge storage
//!
//! Every edge is stored three times: `feeds` (from -> set of to),
//! `fed_by` (to -> set of from), and a combined `edges` map carrying the
//! per-edge `via_send_only` flag. All three views are updated together in
//! `add`/`remove`; nothing else mutates them.
//!
//! ## Feedback handling
//!
//! A routing cycle is not an error the graph can refuse to represent: the
//! operator wired it, and the engine has to keep running until they break
//! it. `resort` therefore always returns a total order. When the hard
//! (non-send) edges contain a cycle the order is best-effort, the cycle
//! members are reported, and the graph stays in a degraded state until a
//! later sort succeeds.

use std::collections::{HashMap, HashSet, VecDeque};

use fw_core::ChannelId;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// EDGES
// ═══════════════════════════════════════════════════════════════════════════

/// Per-edge routing data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEdge {
    /// Connection exists only through an aux send, not the main signal
    /// path. Send-only edges do not participate in hard cycle detection.
    pub via_send_only: bool,
}

/// Graph mutation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Cannot connect a channel to itself
    SelfReference(ChannelId),
    /// Endpoint is not registered in the graph
    UnknownChannel(ChannelId),
    /// Edge already present
    DuplicateEdge { from: ChannelId, to: ChannelId },
}

// ═══════════════════════════════════════════════════════════════════════════
// SORT OUTCOME
// ═══════════════════════════════════════════════════════════════════════════

/// Feedback diagnosis carried alongside a best-effort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    /// Total ordering of all channels; cycle members appended in
    /// discovery order after every properly sortable channel.
    pub order: Vec<ChannelId>,
    /// Channels participating in the unresolved hard cycle.
    pub members: Vec<ChannelId>,
}

/// Result of a sort pass, including the degraded-state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortReport {
    /// Processing order (always total, possibly best-effort)
    pub order: Vec<ChannelId>,
    /// Cycle members when the sort was degraded, empty otherwise
    pub cycle: Vec<ChannelId>,
    /// This pass entered the degraded state (feedback newly detected)
    pub feedback_detected: bool,
    /// This pass left the degraded state (a full sort succeeded again)
    pub recovered: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUTING GRAPH
// ═══════════════════════════════════════════════════════════════════════════

/// Directed channel graph with redundant adjacency views
#[derive(Debug, Default)]
pub struct RoutingGraph {
    /// from -> set(to)
    feeds: HashMap<ChannelId, HashSet<ChannelId>>,
    /// to -> set(from)
    fed_by: HashMap<ChannelId, HashSet<ChannelId>>,
    /// Combined map carrying the send-only flag
    edges: HashMap<(ChannelId, ChannelId), RouteEdge>,
    /// Channels known to the graph (a channel may have no edges)
    nodes: HashSet<ChannelId>,
    /// Last sort ended with unresolved feedback
    degraded: bool,
}

impl RoutingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. Idempotent.
    pub fn add_channel(&mut self, id: ChannelId) {
        self.nodes.insert(id);
    }

    /// Remove a channel and every edge referencing it.
    /// Returns the removed edges so the caller can replay control-state
    /// deltas for the now-disconnected neighbors.
    pub fn remove_channel(&mut self, id: ChannelId) -> Vec<(ChannelId, ChannelId, RouteEdge)> {
        let mut removed = Vec::new();
        if !self.nodes.remove(&id) {
            return removed;
        }

        let outgoing: Vec<ChannelId> = self.feeds.get(&id).into_iter().flatten().copied().collect();
        let incoming: Vec<ChannelId> = self.fed_by.get(&id).into_iter().flatten().copied().collect();

        for to in outgoing {
            if let Some(edge) = self.detach(id, to) {
                removed.push((id, to, edge));
            }
        }
        for from in incoming {
            if let Some(edge) = self.detach(from, id) {
                removed.push((from, id, edge));
            }
        }

        self.feeds.remove(&id);
        self.fed_by.remove(&id);
        removed
    }

    /// Channel count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Add an edge. All three views are updated before returning.
    pub fn add(
        &mut self,
        from: ChannelId,
        to: ChannelId,
        via_send_only: bool,
    ) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfReference(from));
        }
        if !self.nodes.contains(&from) {
            return Err(GraphError::UnknownChannel(from));
        }
        if !self.nodes.contains(&to) {
            return Err(GraphError::UnknownChannel(to));
        }
        if self.edges.contains_key(&(from, to)) {
            return Err(GraphError::DuplicateEdge { from, to });
        }

        self.feeds.entry(from).or_default().insert(to);
        self.fed_by.entry(to).or_default().insert(from);
        self.edges.insert((from, to), RouteEdge { via_send_only });
        Ok(())
    }

    /// Remove an edge from all three views. Returns the edge if present.
    pub fn remove(&mut self, from: ChannelId, to: ChannelId) -> Option<RouteEdge> {
        self.detach(from, to)
    }

    fn detach(&mut self, from: ChannelId, to: ChannelId) -> Option<RouteEdge> {
        let edge = self.edges.remove(&(from, to))?;
        if let Some(set) = self.feeds.get_mut(&from) {
            set.remove(&to);
        }
        if let Some(set) = self.fed_by.get_mut(&to) {
            set.remove(&from);
        }
        Some(edge)
    }

    /// Edge lookup
    pub fn edge(&self, from: ChannelId, to: ChannelId) -> Option<&RouteEdge> {
        self.edges.get(&(from, to))
    }

    /// Does `from` feed `to` directly?
    pub fn feeds(&self, from: ChannelId, to: ChannelId) -> bool {
        self.edges.contains_key(&(from, to))
    }

    /// Channels that `ch` feeds (outgoing edges)
    pub fn edges_from(&self, ch: ChannelId) -> impl Iterator<Item = ChannelId> + '_ {
        self.feeds.get(&ch).into_iter().flatten().copied()
    }

    /// Channels feeding `ch` (incoming edges)
    pub fn feeders_of(&self, ch: ChannelId) -> impl Iterator<Item = ChannelId> + '_ {
        self.fed_by.get(&ch).into_iter().flatten().copied()
    }

    /// Channels feeding `ch` over the main signal path (send-only edges
    /// skipped). This is the adjacency solo propagation walks.
    pub fn hard_feeders_of(&self, ch: ChannelId) -> impl Iterator<Item = ChannelId> + '_ {
        self.feeders_of(ch)
            .filter(move |&from| !self.edges[&(from, ch)].via_send_only)
    }

    /// Channels `ch` feeds over the main signal path.
    pub fn hard_targets_of(&self, ch: ChannelId) -> impl Iterator<Item = ChannelId> + '_ {
        self.edges_from(ch)
            .filter(move |&to| !self.edges[&(ch, to)].via_send_only)
    }

    /// True when nothing feeds `ch`.
    pub fn has_none_incoming(&self, ch: ChannelId) -> bool {
        self.fed_by.get(&ch).is_none_or(|s| s.is_empty())
    }

    /// Last sort left the graph degraded (unresolved feedback).
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    // ═══════════════════════════════════════════════════════════════════
    // TOPOLOGICAL SORT
    // ═══════════════════════════════════════════════════════════════════

    /// Compute the processing order using Kahn's algorithm over the hard
    /// edges. Send-only edges never constrain the order; an aux send is
    /// delivered late regardless of where its target is scheduled.
    ///
    /// On feedback this still terminates and still returns a total order:
    /// the cycle members are appended after every sortable channel, in
    /// discovery order, inside the `Feedback` value.
    pub fn topological_order(&self) -> Result<Vec<ChannelId>, Feedback> {
        let mut in_degree: HashMap<ChannelId, usize> = HashMap::new();
        for &id in &self.nodes {
            in_degree.insert(id, 0);
        }
        for (&(_, to), edge) in &self.edges {
            if !edge.via_send_only {
                *in_degree.entry(to).or_insert(0) += 1;
            }
        }

        // Seed with source channels; sorted by id so the order is stable
        // across runs regardless of map iteration order.
        let mut seeds: Vec<ChannelId> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        seeds.sort();

        let mut queue: VecDeque<ChannelId> = seeds.into();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(targets) = self.feeds.get(&id) {
                let mut ready: Vec<ChannelId> = Vec::new();
                for &to in targets {
                    if self.edges[&(id, to)].via_send_only {
                        continue;
                    }
                    if let Some(deg) = in_degree.get_mut(&to) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push(to);
                        }
                    }
                }
                ready.sort();
                queue.extend(ready);
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        // Hard cycle: append the members in discovery order so the caller
        // still has a total order to run with.
        let placed: HashSet<ChannelId> = order.iter().copied().collect();
        let mut members: Vec<ChannelId> =
            self.nodes.iter().copied().filter(|id| !placed.contains(id)).collect();
        members.sort();
        order.extend(&members);
        Err(Feedback { order, members })
    }

    /// Sort and track the degraded-state transition. The session maps
    /// `feedback_detected`/`recovered` onto its session-wide signals.
    pub fn resort(&mut self) -> SortReport {
        match self.topological_order() {
            Ok(order) => {
                let recovered = self.degraded;
                self.degraded = false;
                SortReport {
                    order,
                    cycle: Vec::new(),
                    feedback_detected: false,
                    recovered,
                }
            }
            Err(feedback) => {
                let newly = !self.degraded;
                self.degraded = true;
                if newly {
                    log::warn!(
                        "routing feedback detected, {} channel(s) in cycle; running best-effort order",
                        feedback.members.len()
                    );
                }
                SortReport {
                    order: feedback.order,
                    cycle: feedback.members,
                    feedback_detected: newly,
                    recovered: false,
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(n: u32) -> RoutingGraph {
        let mut g = RoutingGraph::new();
        for i in 0..n {
            g.add_channel(ChannelId(i));
        }
        g
    }

    #[test]
    fn test_add_remove_edge_updates_all_views() {
        let mut g = graph_with(2);
        g.add(ChannelId(0), ChannelId(1), false).unwrap();

        assert!(g.feeds(ChannelId(0), ChannelId(1)));
        assert_eq!(g.edges_from(ChannelId(0)).collect::<Vec<_>>(), vec![ChannelId(1)]);
        assert_eq!(g.feeders_of(ChannelId(1)).collect::<Vec<_>>(), vec![ChannelId(0)]);
        assert!(g.edge(ChannelId(0), ChannelId(1)).is_some());

        let edge = g.remove(ChannelId(0), ChannelId(1)).unwrap();
        assert!(!edge.via_send_only);
        assert!(!g.feeds(ChannelId(0), ChannelId(1)));
        assert_eq!(g.edges_from(ChannelId(0)).count(), 0);
        assert_eq!(g.feeders_of(ChannelId(1)).count(), 0);
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut g = graph_with(1);
        assert_eq!(
            g.add(ChannelId(0), ChannelId(0), false),
            Err(GraphError::SelfReference(ChannelId(0)))
        );
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut g = graph_with(2);
        g.add(ChannelId(0), ChannelId(1), false).unwrap();
        assert!(matches!(
            g.add(ChannelId(0), ChannelId(1), true),
            Err(GraphError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_has_none_incoming() {
        let mut g = graph_with(2);
        assert!(g.has_none_incoming(ChannelId(1)));
        g.add(ChannelId(0), ChannelId(1), false).unwrap();
        assert!(!g.has_none_incoming(ChannelId(1)));
        assert!(g.has_none_incoming(ChannelId(0)));
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let mut g = graph_with(4);
        // 2 -> 1 -> 0, 3 -> 0
        g.add(ChannelId(2), ChannelId(1), false).unwrap();
        g.add(ChannelId(1), ChannelId(0), false).unwrap();
        g.add(ChannelId(3), ChannelId(0), false).unwrap();

        let order = g.topological_order().unwrap();
        assert_eq!(order.len(), 4);
        let pos = |id: ChannelId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(ChannelId(2)) < pos(ChannelId(1)));
        assert!(pos(ChannelId(1)) < pos(ChannelId(0)));
        assert!(pos(ChannelId(3)) < pos(ChannelId(0)));
    }

    #[test]
    fn test_cycle_returns_total_best_effort_order() {
        let mut g = graph_with(4);
        // 0 -> 1 -> 2 -> 0 (hard cycle), 3 independent
        g.add(ChannelId(0), ChannelId(1), false).unwrap();
        g.add(ChannelId(1), ChannelId(2), false).unwrap();
        g.add(ChannelId(2), ChannelId(0), false).unwrap();

        let feedback = g.topological_order().unwrap_err();
        assert_eq!(feedback.order.len(), 4);
        assert_eq!(feedback.members.len(), 3);
        assert!(!feedback.members.contains(&ChannelId(3)));
        // Every channel appears exactly once.
        let mut seen = feedback.order.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_send_only_edge_breaks_no_cycle() {
        let mut g = graph_with(2);
        // Hard edge one way, send back the other: not a hard cycle.
        g.add(ChannelId(0), ChannelId(1), false).unwrap();
        g.add(ChannelId(1), ChannelId(0), true).unwrap();

        let order = g.topological_order().unwrap();
        let pos = |id: ChannelId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(ChannelId(0)) < pos(ChannelId(1)));
    }

    #[test]
    fn test_hard_feeders_skip_sends() {
        let mut g = graph_with(3);
        g.add(ChannelId(0), ChannelId(2), false).unwrap();
        g.add(ChannelId(1), ChannelId(2), true).unwrap();

        let hard: Vec<ChannelId> = g.hard_feeders_of(ChannelId(2)).collect();
        assert_eq!(hard, vec![ChannelId(0)]);
        assert_eq!(g.feeders_of(ChannelId(2)).count(), 2);
    }

    #[test]
    fn test_degraded_transitions() {
        let mut g = graph_with(2);
        g.add(ChannelId(0), ChannelId(1), false).unwrap();
        g.add(ChannelId(1), ChannelId(0), false).unwrap();

        let report = g.resort();
        assert!(report.feedback_detected);
        assert!(g.is_degraded());

        // Same cycle again: already degraded, no second detection edge.
        let report = g.resort();
        assert!(!report.feedback_detected);
        assert!(!report.recovered);

        // Operator breaks the cycle: one recovery edge.
        g.remove(ChannelId(1), ChannelId(0)).unwrap();
        let report = g.resort();
        assert!(report.recovered);
        assert!(!g.is_degraded());
        assert!(report.cycle.is_empty());
    }

    #[test]
    fn test_remove_channel_prunes_edges() {
        let mut g = graph_with(3);
        g.add(ChannelId(0), ChannelId(1), false).unwrap();
        g.add(ChannelId(1), ChannelId(2), true).unwrap();

        let removed = g.remove_channel(ChannelId(1));
        assert_eq!(removed.len(), 2);
        assert!(g.edges_from(ChannelId(0)).count() == 0);
        assert!(g.has_none_incoming(ChannelId(2)));
        assert_eq!(g.len(), 2);
    }
}
