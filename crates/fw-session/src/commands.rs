//! Lock-free command queue between control threads and the render thread
//!
//! The session is owned by the render-thread side (`SessionProcessor`,
//! not Sync). Writes originating anywhere else travel as discrete
//! commands over an SPSC ring buffer and are applied at exactly one
//! mutation slot per render cycle, so a callback never observes a
//! half-applied change. Signals travel back the same way and are fanned
//! out to subscribers off the render thread.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use fw_core::{ChannelId, ChannelKind, ControlKind, GroupDisposition, MasterHandle};
use fw_control::{AutomationMode, ControlCurve, MutePoint, MutePointMask, UNITY_GAIN};

use crate::config::SessionConfig;
use crate::session::Session;
use crate::signal::{SessionMirror, SessionSignal};

/// Command queue capacity
const COMMAND_QUEUE_SIZE: usize = 1024;
/// Signal queue capacity
const SIGNAL_QUEUE_SIZE: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════

/// Commands sent from non-real-time threads to the session processor
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Create a channel (the mutation slot allocates)
    CreateChannel {
        kind: ChannelKind,
        name: String,
        callback_id: u32,
    },
    RemoveChannel {
        id: ChannelId,
    },

    // Routing
    Connect {
        from: ChannelId,
        to: ChannelId,
        via_send_only: bool,
    },
    Disconnect {
        from: ChannelId,
        to: ChannelId,
    },

    // Per-channel controls
    SetSelfSolo {
        id: ChannelId,
        solo: bool,
        disposition: GroupDisposition,
    },
    SetSelfMute {
        id: ChannelId,
        mute: bool,
        disposition: GroupDisposition,
    },
    SetIsolated {
        id: ChannelId,
        isolated: bool,
        disposition: GroupDisposition,
    },
    SetSafe {
        id: ChannelId,
        safe: bool,
        disposition: GroupDisposition,
    },
    SetMutePoints {
        id: ChannelId,
        mask: MutePointMask,
    },
    SetMuteAutomation {
        id: ChannelId,
        mode: AutomationMode,
    },
    ReplaceMuteCurve {
        id: ChannelId,
        curve: Box<ControlCurve>,
    },

    // Master/slave links
    AddMasterLink {
        slave: ChannelId,
        master: MasterHandle,
    },
    RemoveMasterLink {
        slave: ChannelId,
        kind: ControlKind,
        master: Option<MasterHandle>,
    },

    // Coordinator operations
    CancelAllSolo {
        disposition: GroupDisposition,
    },
    SetAllSolo {
        solo: bool,
        disposition: GroupDisposition,
    },
    MomentarySoloPress {
        id: ChannelId,
        disposition: GroupDisposition,
    },
    MomentarySoloRelease {
        was_active: bool,
        exclusive: bool,
    },

    SetConfig {
        config: SessionConfig,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// PROCESSOR (render-thread side)
// ═══════════════════════════════════════════════════════════════════════════

/// Render-thread owner of the session.
/// NOTE: not Sync (rtrb endpoints); keep it on the render thread.
pub struct SessionProcessor {
    session: Session,
    command_rx: Consumer<SessionCommand>,
    signal_tx: Producer<SessionSignal>,
}

impl SessionProcessor {
    /// Build a processor/handle pair around a fresh session.
    pub fn new(config: SessionConfig) -> (SessionProcessor, SessionHandle) {
        Self::with_session(Session::new(config))
    }

    /// Wrap an existing session (e.g. one rebuilt from a document).
    pub fn with_session(session: Session) -> (SessionProcessor, SessionHandle) {
        let (command_tx, command_rx) = RingBuffer::new(COMMAND_QUEUE_SIZE);
        let (signal_tx, signal_rx) = RingBuffer::new(SIGNAL_QUEUE_SIZE);
        let mirror = session.mirror();
        let processor = SessionProcessor {
            session,
            command_rx,
            signal_tx,
        };
        let handle = SessionHandle {
            command_tx,
            signal_rx,
            mirror,
            subscribers: Mutex::new(Vec::new()),
        };
        (processor, handle)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Direct access for embedding without a render thread (tests,
    /// offline render).
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The cycle's single mutation slot: apply every queued command,
    /// then resolve audibility for the coming block and publish the
    /// accumulated signals.
    pub fn begin_cycle(&mut self, transport_pos: u64) {
        while let Ok(cmd) = self.command_rx.pop() {
            self.apply(cmd);
        }
        self.session.resolve_audibility(transport_pos);
        for sig in self.session.take_signals() {
            if self.signal_tx.push(sig).is_err() {
                // Subscriber side stalled; dropping is preferable to
                // blocking the render thread.
                log::warn!("signal queue full, dropping session signal");
            }
        }
    }

    /// Already-resolved gain read for the render path.
    #[inline]
    pub fn gain_at(&self, id: ChannelId, point: MutePoint) -> f64 {
        self.session
            .channel(id)
            .map(|ch| ch.gain_at(point))
            .unwrap_or(UNITY_GAIN)
    }

    /// Already-resolved audibility read for the render path.
    #[inline]
    pub fn is_audible(&self, id: ChannelId) -> bool {
        self.session
            .channel(id)
            .is_some_and(|ch| ch.audible())
    }

    fn apply(&mut self, cmd: SessionCommand) {
        let result = match cmd {
            SessionCommand::CreateChannel {
                kind,
                name,
                callback_id,
            } => {
                let id = self.session.create_channel(kind, Some(&name));
                self.session
                    .signal(SessionSignal::ChannelCreated { callback_id, id });
                Ok(())
            }
            SessionCommand::RemoveChannel { id } => self.session.remove_channel(id),
            SessionCommand::Connect {
                from,
                to,
                via_send_only,
            } => self.session.connect(from, to, via_send_only),
            SessionCommand::Disconnect { from, to } => self.session.disconnect(from, to),
            SessionCommand::SetSelfSolo {
                id,
                solo,
                disposition,
            } => self.session.set_self_solo(id, solo, disposition),
            SessionCommand::SetSelfMute {
                id,
                mute,
                disposition,
            } => self.session.set_self_mute(id, mute, disposition),
            SessionCommand::SetIsolated {
                id,
                isolated,
                disposition,
            } => self.session.set_isolated(id, isolated, disposition),
            SessionCommand::SetSafe {
                id,
                safe,
                disposition,
            } => self.session.set_safe(id, safe, disposition),
            SessionCommand::SetMutePoints { id, mask } => self.session.set_mute_points(id, mask),
            SessionCommand::SetMuteAutomation { id, mode } => {
                self.session.set_mute_automation(id, mode)
            }
            SessionCommand::ReplaceMuteCurve { id, curve } => {
                self.session.set_mute_curve(id, *curve)
            }
            SessionCommand::AddMasterLink { slave, master } => {
                self.session.add_master_link(slave, master)
            }
            SessionCommand::RemoveMasterLink {
                slave,
                kind,
                master,
            } => self.session.remove_master_link(slave, kind, master),
            SessionCommand::CancelAllSolo { disposition } => {
                self.session.cancel_all_solo(disposition);
                Ok(())
            }
            SessionCommand::SetAllSolo { solo, disposition } => {
                self.session.set_all_solo(solo, disposition);
                Ok(())
            }
            SessionCommand::MomentarySoloPress { id, disposition } => {
                self.session.momentary_solo_press(id, disposition)
            }
            SessionCommand::MomentarySoloRelease {
                was_active,
                exclusive,
            } => {
                self.session.momentary_solo_release(was_active, exclusive);
                Ok(())
            }
            SessionCommand::SetConfig { config } => {
                self.session.set_config(config);
                Ok(())
            }
        };
        if let Err(e) = result {
            self.session.signal(SessionSignal::CommandFailed {
                message: e.to_string(),
            });
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HANDLE (non-real-time side)
// ═══════════════════════════════════════════════════════════════════════════

/// Thread-facing handle: enqueue commands, drain signals, read mirrors.
pub struct SessionHandle {
    command_tx: Producer<SessionCommand>,
    signal_rx: Consumer<SessionSignal>,
    mirror: Arc<SessionMirror>,
    subscribers: Mutex<Vec<Sender<SessionSignal>>>,
}

impl SessionHandle {
    /// Enqueue a command (lock-free, non-blocking).
    /// Returns false if the queue is full.
    pub fn send(&mut self, cmd: SessionCommand) -> bool {
        self.command_tx.push(cmd).is_ok()
    }

    pub fn set_self_solo(&mut self, id: ChannelId, solo: bool, disposition: GroupDisposition) -> bool {
        self.send(SessionCommand::SetSelfSolo {
            id,
            solo,
            disposition,
        })
    }

    pub fn set_self_mute(&mut self, id: ChannelId, mute: bool, disposition: GroupDisposition) -> bool {
        self.send(SessionCommand::SetSelfMute {
            id,
            mute,
            disposition,
        })
    }

    pub fn set_isolated(&mut self, id: ChannelId, isolated: bool, disposition: GroupDisposition) -> bool {
        self.send(SessionCommand::SetIsolated {
            id,
            isolated,
            disposition,
        })
    }

    pub fn set_safe(&mut self, id: ChannelId, safe: bool, disposition: GroupDisposition) -> bool {
        self.send(SessionCommand::SetSafe {
            id,
            safe,
            disposition,
        })
    }

    pub fn create_channel(&mut self, kind: ChannelKind, name: String, callback_id: u32) -> bool {
        self.send(SessionCommand::CreateChannel {
            kind,
            name,
            callback_id,
        })
    }

    pub fn connect(&mut self, from: ChannelId, to: ChannelId, via_send_only: bool) -> bool {
        self.send(SessionCommand::Connect {
            from,
            to,
            via_send_only,
        })
    }

    pub fn cancel_all_solo(&mut self, disposition: GroupDisposition) -> bool {
        self.send(SessionCommand::CancelAllSolo { disposition })
    }

    /// Pop one pending signal (non-blocking).
    pub fn poll_signal(&mut self) -> Option<SessionSignal> {
        self.signal_rx.pop().ok()
    }

    /// Subscribe to the signal fan-out. Delivery happens on `pump`.
    pub fn subscribe(&self) -> Receiver<SessionSignal> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Drain pending signals, forward them to every subscriber, and
    /// return them. Call from a GUI/event-loop tick, never from the
    /// render thread.
    pub fn pump(&mut self) -> Vec<SessionSignal> {
        let mut drained = Vec::new();
        while let Ok(sig) = self.signal_rx.pop() {
            drained.push(sig);
        }
        if !drained.is_empty() {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|tx| {
                drained.iter().all(|sig| tx.send(sig.clone()).is_ok())
            });
        }
        drained
    }

    // Lock-free mirror reads (any thread)

    pub fn solo_active(&self) -> bool {
        self.mirror.solo_active()
    }

    pub fn graph_degraded(&self) -> bool {
        self.mirror.graph_degraded()
    }

    pub fn channel_count(&self) -> u32 {
        self.mirror.channel_count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const NO_GROUP: GroupDisposition = GroupDisposition::NoGroup;

    #[test]
    fn test_commands_apply_at_cycle_slot() {
        let (mut processor, mut handle) = SessionProcessor::new(SessionConfig::default());
        let id = processor
            .session_mut()
            .create_channel(ChannelKind::Audio, Some("T"));
        processor.begin_cycle(0);
        handle.pump();

        handle.set_self_solo(id, true, NO_GROUP);
        // Not yet applied: the slot has not run.
        assert!(!processor.session().channel(id).unwrap().solo.soloed());

        processor.begin_cycle(0);
        assert!(processor.session().channel(id).unwrap().solo.soloed());
        assert!(handle.solo_active());

        let signals = handle.pump();
        assert!(signals.contains(&SessionSignal::SoloChanged(id)));
        assert!(signals.contains(&SessionSignal::SoloActive(true)));
    }

    #[test]
    fn test_create_channel_via_command() {
        let (mut processor, mut handle) = SessionProcessor::new(SessionConfig::default());
        handle.create_channel(ChannelKind::Bus, "Drums".to_string(), 42);
        processor.begin_cycle(0);

        let created = handle
            .pump()
            .into_iter()
            .find_map(|sig| match sig {
                SessionSignal::ChannelCreated { callback_id, id } => Some((callback_id, id)),
                _ => None,
            })
            .expect("expected ChannelCreated");
        assert_eq!(created.0, 42);
        assert_eq!(
            processor.session().channel(created.1).unwrap().name,
            "Drums"
        );
        assert_eq!(handle.channel_count(), 1);
    }

    #[test]
    fn test_failed_command_reports_without_unwinding() {
        let (mut processor, mut handle) = SessionProcessor::new(SessionConfig::default());
        handle.set_self_solo(ChannelId(999), true, NO_GROUP);
        processor.begin_cycle(0);

        let signals = handle.pump();
        assert!(signals
            .iter()
            .any(|sig| matches!(sig, SessionSignal::CommandFailed { .. })));
    }

    #[test]
    fn test_render_reads_resolved_gain() {
        let (mut processor, mut handle) = SessionProcessor::new(SessionConfig::default());
        let a = processor
            .session_mut()
            .create_channel(ChannelKind::Audio, Some("A"));
        let b = processor
            .session_mut()
            .create_channel(ChannelKind::Audio, Some("B"));

        handle.set_self_solo(a, true, NO_GROUP);
        processor.begin_cycle(0);

        assert!(processor.is_audible(a));
        assert!(!processor.is_audible(b));
        assert_eq!(processor.gain_at(b, MutePoint::Main), 0.0);
        // Unknown channels read as unity; absence is not an error here.
        assert_eq!(processor.gain_at(ChannelId(77), MutePoint::Main), UNITY_GAIN);
    }

    #[test]
    fn test_subscribers_receive_fanout() {
        let (mut processor, mut handle) = SessionProcessor::new(SessionConfig::default());
        let rx = handle.subscribe();
        let id = processor
            .session_mut()
            .create_channel(ChannelKind::Audio, Some("T"));
        processor.begin_cycle(0);
        handle.pump();

        handle.set_self_mute(id, true, NO_GROUP);
        processor.begin_cycle(0);
        handle.pump();

        let got: Vec<SessionSignal> = rx.try_iter().collect();
        assert!(got.contains(&SessionSignal::MuteChanged(id)));
    }
}
