//! Session control document
//!
//! Serializes the per-channel solo/mute/isolate/safe state and the
//! routing edges. Counters and engaged counts are never written back
//! directly on load: the saved values are replayed through the same
//! incremental API used at runtime (`mod_by_*`, `add_master`), so every
//! derived invariant is re-established rather than trusted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use fw_core::{ChannelId, ChannelKind, FwError, FwResult, MasterHandle};
use fw_control::{AutomationMode, ControlCurve, MutePointMask};

use crate::config::SessionConfig;
use crate::session::Session;
use crate::signal::SessionSignal;

// ═══════════════════════════════════════════════════════════════════════════
// DOCUMENT TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// Persisted control state of one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelState {
    pub id: u32,
    pub kind: ChannelKind,
    pub name: String,
    pub self_solo: bool,
    pub soloed_by_upstream: u32,
    pub soloed_by_downstream: u32,
    pub solo_isolated: bool,
    pub isolated_by_upstream: u32,
    pub solo_safe: bool,
    pub muted_by_self: bool,
    pub mute_points: u8,
    pub mute_automation: AutomationMode,
    #[serde(default)]
    pub mute_curve: ControlCurve,
    #[serde(default)]
    pub solo_masters: Vec<MasterHandle>,
    #[serde(default)]
    pub mute_masters: Vec<MasterHandle>,
}

/// Persisted routing edge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RouteState {
    pub from: u32,
    pub to: u32,
    pub via_send_only: bool,
}

/// Whole-session control document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub config: SessionConfig,
    pub channels: Vec<ChannelState>,
    pub routes: Vec<RouteState>,
}

// ═══════════════════════════════════════════════════════════════════════════
// SAVE / LOAD
// ═══════════════════════════════════════════════════════════════════════════

impl Session {
    /// Capture the control document. Channels and routes are emitted in
    /// id order so documents diff cleanly.
    pub fn save_document(&self) -> SessionDocument {
        let mut channels: Vec<ChannelState> = self
            .channels()
            .map(|ch| ChannelState {
                id: ch.id.0,
                kind: ch.kind,
                name: ch.name.clone(),
                self_solo: ch.solo.explicit_solo(),
                soloed_by_upstream: ch.solo.by_others_upstream(),
                soloed_by_downstream: ch.solo.by_others_downstream(),
                solo_isolated: ch.isolate.explicit_isolated(),
                isolated_by_upstream: ch.isolate.isolated_by_upstream(),
                solo_safe: ch.safe.is_safe(),
                muted_by_self: ch.mute.muted_by_self(),
                mute_points: ch.mute.mute_points().bits(),
                mute_automation: ch.mute.automation_mode(),
                mute_curve: ch.mute.curve().clone(),
                solo_masters: ch.solo.masters().collect(),
                mute_masters: ch.mute.masters().collect(),
            })
            .collect();
        channels.sort_by_key(|c| c.id);

        let mut routes = Vec::new();
        for &from in &self.channel_ids() {
            for to in self.graph().edges_from(from) {
                let via_send_only = self
                    .graph()
                    .edge(from, to)
                    .map(|e| e.via_send_only)
                    .unwrap_or(false);
                routes.push(RouteState {
                    from: from.0,
                    to: to.0,
                    via_send_only,
                });
            }
        }
        routes.sort_by_key(|r| (r.from, r.to));

        SessionDocument {
            config: self.config().clone(),
            channels,
            routes,
        }
    }

    /// Rebuild a session from a document.
    pub fn load_document(doc: &SessionDocument) -> FwResult<Session> {
        let mut session = Session::new(doc.config.clone());

        // Channels first (the master at id 0 already exists).
        for ch in &doc.channels {
            let id = ChannelId(ch.id);
            if !id.is_master() {
                session.restore_channel(id, ch.kind, &ch.name);
            }
        }

        // Edges next, while no solo state is set: nothing to replay yet.
        for route in &doc.routes {
            session
                .graph_mut()
                .add(ChannelId(route.from), ChannelId(route.to), route.via_send_only)
                .map_err(|e| FwError::State(format!("bad route in document: {:?}", e)))?;
        }

        // Raw flags, without propagation: the document carries what
        // propagation produced at save time.
        for state in &doc.channels {
            let id = ChannelId(state.id);
            let Some(ch) = session.channel_mut(id) else {
                continue;
            };
            ch.solo.set_self_solo(state.self_solo);
            ch.mute.actually_set_mute(state.muted_by_self, |_| {});
            ch.mute
                .set_mute_points(MutePointMask::from_bits(state.mute_points));
            ch.mute.set_automation_mode(state.mute_automation);
            ch.mute.set_curve(state.mute_curve.clone());
            ch.isolate.set_isolated(state.solo_isolated);
            ch.safe.set_safe(state.solo_safe);
        }

        // Master links re-added through the runtime API so engaged
        // counts are re-derived, then a catch-up pass fixes links whose
        // master was restored after the slave.
        for state in &doc.channels {
            let id = ChannelId(state.id);
            for &master in state.solo_masters.iter().chain(&state.mute_masters) {
                session.add_master_link_quiet(id, master);
            }
        }
        session.catch_up_master_links();

        // Counters replayed through the incremental API, clamping and
        // all, exactly as runtime propagation would have produced them.
        for state in &doc.channels {
            let id = ChannelId(state.id);
            let Some(ch) = session.channel_mut(id) else {
                continue;
            };
            if state.soloed_by_upstream > 0 {
                ch.solo.mod_by_others_upstream(state.soloed_by_upstream as i32);
            }
            if state.soloed_by_downstream > 0 {
                ch.solo
                    .mod_by_others_downstream(state.soloed_by_downstream as i32);
            }
            if state.isolated_by_upstream > 0 {
                ch.isolate
                    .mod_isolated_by_upstream(state.isolated_by_upstream as i32);
            }
        }

        session.catch_up_on_solo();
        Ok(session)
    }

    /// Write the document as JSON.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> FwResult<()> {
        let doc = self.save_document();
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| FwError::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a document back into a fresh session.
    pub fn load_from<P: AsRef<Path>>(path: P) -> FwResult<Session> {
        let json = fs::read_to_string(path)?;
        let doc: SessionDocument =
            serde_json::from_str(&json).map_err(|e| FwError::Serialization(e.to_string()))?;
        Self::load_document(&doc)
    }

    /// Recompute the session-wide solo bookkeeping from scratch after a
    /// bulk restore, and publish the processing order. Per-channel load
    /// signals are suppressed; only the session-wide state is announced.
    pub(crate) fn catch_up_on_solo(&mut self) {
        let soloed = self.channels().filter(|ch| ch.solo.soloed()).count() as u32;
        self.set_soloed_count(soloed);
        self.take_signals();
        self.refresh_solo_active();
        self.republish_order();
        self.resolve_audibility(0);
        // A recovered/degraded edge from the initial sort is meaningful;
        // everything else from the load is bookkeeping noise.
        let keep: Vec<SessionSignal> = self
            .take_signals()
            .into_iter()
            .filter(|sig| {
                matches!(
                    sig,
                    SessionSignal::SoloActive(_) | SessionSignal::FeedbackDetected
                )
            })
            .collect();
        for sig in keep {
            self.signal(sig);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use fw_core::GroupDisposition;
    use fw_control::MutePoint;

    const NO_GROUP: GroupDisposition = GroupDisposition::NoGroup;

    fn build_session() -> (Session, ChannelId, ChannelId, ChannelId, ChannelId) {
        let mut s = Session::new(SessionConfig::default());
        let a = s.create_channel(ChannelKind::Audio, Some("Kick"));
        let b = s.create_channel(ChannelKind::Bus, Some("Drums"));
        let vca = s.create_channel(ChannelKind::Vca, Some("Rhythm VCA"));
        let aux = s.create_channel(ChannelKind::Aux, Some("Verb"));
        s.connect(a, b, false).unwrap();
        s.connect(b, ChannelId::MASTER, false).unwrap();
        s.connect(a, aux, true).unwrap();
        s.add_master_link(a, MasterHandle::mute(vca)).unwrap();
        s.add_master_link(a, MasterHandle::solo(vca)).unwrap();

        s.set_self_solo(b, true, NO_GROUP).unwrap();
        s.set_self_mute(vca, true, NO_GROUP).unwrap();
        s.set_isolated(aux, true, NO_GROUP).unwrap();
        s.set_safe(ChannelId::MASTER, true, NO_GROUP).unwrap();
        s.set_mute_points(
            a,
            fw_control::MutePointMask::NONE.with(MutePoint::Main),
        )
        .unwrap();
        (s, a, b, vca, aux)
    }

    #[test]
    fn test_round_trip_reproduces_state() {
        let (mut original, a, b, vca, _aux) = build_session();
        original.resolve_audibility(0);
        let doc = original.save_document();

        let mut restored = Session::load_document(&doc).unwrap();
        restored.resolve_audibility(0);

        for id in original.channel_ids() {
            let o = original.channel(id).unwrap();
            let r = restored.channel(id).unwrap();
            assert_eq!(o.solo.explicit_solo(), r.solo.explicit_solo(), "{:?}", id);
            assert_eq!(
                o.solo.by_others_upstream(),
                r.solo.by_others_upstream(),
                "{:?}",
                id
            );
            assert_eq!(
                o.solo.by_others_downstream(),
                r.solo.by_others_downstream(),
                "{:?}",
                id
            );
            assert_eq!(o.solo.soloed(), r.solo.soloed(), "{:?}", id);
            assert_eq!(o.mute.muted(), r.mute.muted(), "{:?}", id);
            assert_eq!(o.mute.mute_points(), r.mute.mute_points(), "{:?}", id);
            assert_eq!(
                o.isolate.solo_isolated(),
                r.isolate.solo_isolated(),
                "{:?}",
                id
            );
            assert_eq!(o.safe.is_safe(), r.safe.is_safe(), "{:?}", id);
            assert_eq!(o.audible(), r.audible(), "{:?}", id);
        }

        // Engaged counts were re-derived, not copied.
        assert_eq!(
            original.channel(a).unwrap().mute.muted_by_masters(),
            restored.channel(a).unwrap().mute.muted_by_masters()
        );
        assert!(restored.channel(a).unwrap().mute.muted_by_masters());
        assert_eq!(restored.channel(a).unwrap().mute.master_count(), 1);
        assert!(restored.channel(a).unwrap().mute.has_master(MasterHandle::mute(vca)));

        assert_eq!(original.solo_active(), restored.solo_active());
        assert!(restored.channel(b).unwrap().solo.soloed());

        // Saving the restored session yields the same document.
        assert_eq!(
            serde_json::to_string(&doc).unwrap(),
            serde_json::to_string(&restored.save_document()).unwrap()
        );
    }

    #[test]
    fn test_file_round_trip() {
        let (original, _a, b, _vca, _aux) = build_session();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controls.json");

        original.save_to(&path).unwrap();
        let restored = Session::load_from(&path).unwrap();

        assert!(restored.channel(b).unwrap().solo.soloed());
        assert_eq!(
            restored.channel_ids().len(),
            original.channel_ids().len()
        );
        assert_eq!(restored.graph().len(), original.graph().len());
    }

    #[test]
    fn test_document_field_names_are_kebab_case() {
        let (original, _a, _b, _vca, _aux) = build_session();
        let json = serde_json::to_string(&original.save_document()).unwrap();
        assert!(json.contains("\"self-solo\""));
        assert!(json.contains("\"soloed-by-upstream\""));
        assert!(json.contains("\"soloed-by-downstream\""));
        assert!(json.contains("\"solo-isolated\""));
        assert!(json.contains("\"solo-safe\""));
        assert!(json.contains("\"mute-points\""));
        assert!(json.contains("\"via-send-only\""));
    }
}
