//! SignalRouter use case: applies signaling envelopes to the session table
//! and delivers them to their one intended recipient.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::identity::PeerIdentity;
use crate::domain::signal::{SignalEnvelope, SignalType};

use super::ports::{Outbound, SignalCodec};
use super::registry::ConnectionRegistry;
use super::sessions::{CallSessionTable, SignalOutcome};

/// What happened to one routed envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteReport {
    pub outcome: SignalOutcome,
    /// Whether the forwarded envelope (or busy reply) reached a live link.
    pub delivered: bool,
}

pub struct SignalRouter {
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<CallSessionTable>,
    codec: Arc<dyn SignalCodec>,
}

impl std::fmt::Debug for SignalRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRouter")
            .field("registry", &self.registry)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl SignalRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        sessions: Arc<CallSessionTable>,
        codec: Arc<dyn SignalCodec>,
    ) -> Self {
        Self {
            registry,
            sessions,
            codec,
        }
    }

    /// Route one text frame received from `sender`'s signaling connection.
    ///
    /// Returns `None` when the frame was dropped before reaching the state
    /// machine (malformed, or claiming another sender).
    pub fn route(&self, sender: &PeerIdentity, text: &str) -> Option<RouteReport> {
        let envelope = match self.codec.decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(%sender, "Dropping signal: {e}");
                return None;
            }
        };
        if &envelope.from != sender {
            warn!(%sender, claimed = %envelope.from, "Dropping signal with mismatched sender");
            return None;
        }
        Some(self.dispatch(envelope))
    }

    /// Apply an already-decoded envelope.
    ///
    /// An offer to a peer with no open signaling link is answered `busy`
    /// without ever entering the session table.
    pub fn dispatch(&self, envelope: SignalEnvelope) -> RouteReport {
        if envelope.signal_type == SignalType::CallOffer
            && envelope.from != envelope.to
            && !self.is_reachable(&envelope.to)
        {
            debug!(caller = %envelope.from, callee = %envelope.to, "Callee not connected, answering busy");
            let reply = SignalEnvelope::busy(envelope.to, envelope.from);
            let delivered = self.deliver(&reply);
            return RouteReport {
                outcome: SignalOutcome::Busy { reply },
                delivered,
            };
        }

        let outcome = self.sessions.apply(&envelope);
        let delivered = match &outcome {
            SignalOutcome::Forward { envelope, .. } => {
                let delivered = self.deliver(envelope);
                if !delivered {
                    self.undelivered(envelope);
                }
                delivered
            }
            SignalOutcome::Busy { reply } => self.deliver(reply),
            SignalOutcome::Ignored { .. } => false,
        };
        RouteReport { outcome, delivered }
    }

    /// An offer or accept that never reached its recipient must not leave
    /// the pair engaged: drop the session and tell the sender.
    fn undelivered(&self, envelope: &SignalEnvelope) {
        let notice = match envelope.signal_type {
            SignalType::CallOffer => SignalEnvelope::busy(envelope.to.clone(), envelope.from.clone()),
            SignalType::CallAccept => SignalEnvelope::hangup(envelope.to.clone(), envelope.from.clone()),
            _ => return,
        };
        if self.sessions.discard(&envelope.from, &envelope.to) {
            info!(from = %envelope.from, to = %envelope.to, signal = %envelope.signal_type, "Signal undeliverable, call dropped");
            self.deliver(&notice);
        }
    }

    /// `identity`'s signaling connection is gone: end its call and tell the
    /// counterpart. Returns how many hangups were delivered.
    pub fn disconnect(&self, identity: &PeerIdentity) -> usize {
        self.sessions
            .end_all_for(identity)
            .iter()
            .filter(|hangup| self.deliver(hangup))
            .count()
    }

    fn is_reachable(&self, identity: &PeerIdentity) -> bool {
        self.registry
            .lookup(identity)
            .is_some_and(|link| link.is_open())
    }

    fn deliver(&self, envelope: &SignalEnvelope) -> bool {
        let Some(link) = self.registry.lookup(&envelope.to) else {
            debug!(to = %envelope.to, signal = %envelope.signal_type, "Recipient not connected");
            return false;
        };
        if !link.is_open() {
            return false;
        }
        let text = match self.codec.encode(envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(to = %envelope.to, "Failed to encode signal: {e}");
                return false;
            }
        };
        match link.send(Outbound::Signal(text)) {
            Ok(_) => true,
            Err(e) => {
                warn!(to = %envelope.to, signal = %envelope.signal_type, "Failed to deliver signal: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapters::ws::codec::JsonSignalCodec;
    use crate::application::ports::PeerLink;
    use crate::application::sessions::IgnoreReason;
    use crate::application::test_support::{id, RecordingLink};
    use crate::domain::session::CallState;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        sessions: Arc<CallSessionTable>,
        router: SignalRouter,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new("signal"));
        let sessions = Arc::new(CallSessionTable::new());
        let router = SignalRouter::new(
            Arc::clone(&registry),
            Arc::clone(&sessions),
            Arc::new(JsonSignalCodec),
        );
        Fixture {
            registry,
            sessions,
            router,
        }
    }

    fn connect(fx: &Fixture, name: &str) -> Arc<RecordingLink> {
        let link = RecordingLink::new();
        fx.registry.register(id(name), link.clone()).unwrap();
        link
    }

    fn frame(from: &str, to: &str, signal_type: &str) -> String {
        json!({
            "type": "rtc-signal",
            "from": from,
            "to": to,
            "signalType": signal_type,
            "payload": {}
        })
        .to_string()
    }

    #[test]
    fn forwards_only_to_intended_recipient() {
        let fx = fixture();
        let alice = connect(&fx, "alice");
        let bob = connect(&fx, "bob");
        let carol = connect(&fx, "carol");

        let report = fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer")).unwrap();

        assert!(report.delivered);
        let received = bob.signals();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["signalType"], "call-offer");
        assert_eq!(received[0]["from"], "alice");
        assert!(alice.sent().is_empty());
        assert!(carol.sent().is_empty());
    }

    #[test]
    fn full_call_flow() {
        let fx = fixture();
        let alice = connect(&fx, "alice");
        let bob = connect(&fx, "bob");

        fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer"));
        fx.router.route(&id("bob"), &frame("bob", "alice", "call-accept"));
        assert_eq!(fx.sessions.state(&id("alice"), &id("bob")), CallState::Active);

        fx.router.route(&id("alice"), &frame("alice", "bob", "hangup"));
        let again = fx.router.route(&id("bob"), &frame("bob", "alice", "hangup")).unwrap();

        assert_eq!(
            again.outcome,
            SignalOutcome::Ignored {
                reason: IgnoreReason::NoSession
            }
        );
        assert!(!again.delivered);
        let types: Vec<_> = bob.signals().iter().map(|s| s["signalType"].clone()).collect();
        assert_eq!(types, vec![json!("call-offer"), json!("hangup")]);
        assert_eq!(alice.signals().len(), 1);
    }

    #[test]
    fn busy_reply_goes_back_to_second_caller() {
        let fx = fixture();
        connect(&fx, "alice");
        let bob = connect(&fx, "bob");
        let carol = connect(&fx, "carol");

        fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer"));
        let report = fx.router.route(&id("carol"), &frame("carol", "bob", "call-offer")).unwrap();

        assert!(matches!(report.outcome, SignalOutcome::Busy { .. }));
        assert!(report.delivered);
        let reply = &carol.signals()[0];
        assert_eq!(reply["signalType"], "busy");
        assert_eq!(reply["from"], "bob");
        assert_eq!(bob.signals().len(), 1);
    }

    #[test]
    fn offer_to_offline_peer_never_rings() {
        let fx = fixture();
        let alice = connect(&fx, "alice");

        let report = fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer")).unwrap();

        assert!(matches!(report.outcome, SignalOutcome::Busy { .. }));
        assert!(report.delivered);
        assert!(fx.sessions.is_empty());
        let reply = &alice.signals()[0];
        assert_eq!(reply["signalType"], "busy");
        assert_eq!(reply["from"], "bob");
    }

    #[test]
    fn offer_to_closing_peer_never_rings() {
        let fx = fixture();
        let alice = connect(&fx, "alice");
        connect(&fx, "bob").close();

        let report = fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer")).unwrap();

        assert!(matches!(report.outcome, SignalOutcome::Busy { .. }));
        assert_eq!(fx.sessions.state(&id("alice"), &id("bob")), CallState::Idle);
        assert_eq!(alice.signals()[0]["signalType"], "busy");
    }

    #[test]
    fn undelivered_accept_ends_call() {
        let fx = fixture();
        let alice = RecordingLink::failing();
        fx.registry.register(id("alice"), alice.clone()).unwrap();
        let bob = connect(&fx, "bob");

        fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer"));
        let report = fx.router.route(&id("bob"), &frame("bob", "alice", "call-accept")).unwrap();

        assert!(!report.delivered);
        assert_eq!(fx.sessions.state(&id("alice"), &id("bob")), CallState::Idle);
        assert!(fx.sessions.active_peer(&id("bob")).is_none());
        let types: Vec<_> = bob.signals().iter().map(|s| s["signalType"].clone()).collect();
        assert_eq!(types, vec![json!("call-offer"), json!("hangup")]);
        assert_eq!(bob.signals()[1]["from"], "alice");
    }

    #[test]
    fn crossed_offer_answered_busy() {
        let fx = fixture();
        let alice = connect(&fx, "alice");
        let bob = connect(&fx, "bob");

        fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer"));
        let report = fx.router.route(&id("bob"), &frame("bob", "alice", "call-offer")).unwrap();

        assert!(report.delivered);
        assert!(alice.sent().is_empty());
        let reply = bob.signals().pop().unwrap();
        assert_eq!(reply["signalType"], "busy");
        assert_eq!(reply["from"], "alice");
        assert_eq!(fx.sessions.state(&id("alice"), &id("bob")), CallState::Ringing);
    }

    #[test]
    fn malformed_and_spoofed_envelopes_are_dropped() {
        let fx = fixture();
        let bob = connect(&fx, "bob");

        assert!(fx.router.route(&id("alice"), "not json").is_none());
        assert!(fx
            .router
            .route(&id("alice"), r#"{"type":"rtc-signal","to":"bob","signalType":"call-offer"}"#)
            .is_none());
        assert!(fx.router.route(&id("alice"), &frame("alice", "bob", "call-wave")).is_none());
        assert!(fx.router.route(&id("mallory"), &frame("alice", "bob", "call-offer")).is_none());

        assert!(bob.sent().is_empty());
        assert!(fx.sessions.is_empty());
    }

    #[test]
    fn disconnect_hangs_up_counterpart() {
        let fx = fixture();
        connect(&fx, "alice");
        let bob = connect(&fx, "bob");
        fx.router.route(&id("alice"), &frame("alice", "bob", "call-offer"));
        fx.router.route(&id("bob"), &frame("bob", "alice", "call-accept"));

        fx.registry.unregister(&id("alice"));
        assert_eq!(fx.router.disconnect(&id("alice")), 1);

        let last = bob.signals().pop().unwrap();
        assert_eq!(last["signalType"], "hangup");
        assert_eq!(last["from"], "alice");
        assert!(fx.sessions.is_empty());
    }
}
