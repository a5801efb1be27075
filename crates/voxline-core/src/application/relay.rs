//! AudioRelay use case: fans inbound audio frames out to other peers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::domain::frame::AudioFrame;
use crate::domain::identity::PeerIdentity;

use super::ports::{Outbound, SendStatus};
use super::registry::{ConnectionRegistry, SharedLink};
use super::sessions::CallSessionTable;

/// Who receives a peer's audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// Every other registered peer.
    #[default]
    Broadcast,
    /// Only the sender's counterpart in an active call.
    Session,
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => f.write_str("broadcast"),
            Self::Session => f.write_str("session"),
        }
    }
}

impl FromStr for RoutingPolicy {
    type Err = ParseRoutingPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "broadcast" => Ok(Self::Broadcast),
            "session" => Ok(Self::Session),
            _ => Err(ParseRoutingPolicyError(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown routing policy {0:?} (expected \"broadcast\" or \"session\")")]
pub struct ParseRoutingPolicyError(String);

/// Per-frame delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Recipients the frame was queued for.
    pub delivered: usize,
    /// Recipients skipped because their link was closing.
    pub skipped: usize,
    /// Recipients whose link refused the frame.
    pub failed: usize,
    /// Recipients that had to discard an older queued frame to take this one.
    pub dropped: usize,
}

impl RelayReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

/// Forwards frames verbatim, never back to the sender.
#[derive(Debug)]
pub struct AudioRelay {
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<CallSessionTable>,
    policy: RoutingPolicy,
}

impl AudioRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        sessions: Arc<CallSessionTable>,
        policy: RoutingPolicy,
    ) -> Self {
        Self {
            registry,
            sessions,
            policy,
        }
    }

    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Forward one frame from `sender`.
    ///
    /// A failing recipient is logged and skipped; it never stops delivery to
    /// the others and never touches the sender's connection.
    pub fn on_frame(&self, sender: &PeerIdentity, frame: &AudioFrame) -> RelayReport {
        let mut report = RelayReport::default();

        for (recipient, link) in self.recipients(sender) {
            if !link.is_open() {
                report.skipped += 1;
                continue;
            }
            match link.send(Outbound::Audio(frame.clone())) {
                Ok(SendStatus::Queued) => report.delivered += 1,
                Ok(SendStatus::QueuedDroppedOldest) => {
                    report.delivered += 1;
                    report.dropped += 1;
                    trace!(%recipient, "Recipient queue full, dropped oldest frame");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(%sender, %recipient, "Failed to forward audio frame: {e}");
                }
            }
        }

        trace!(
            %sender,
            bytes = frame.len(),
            samples = frame.sample_count(),
            duration = ?frame.duration(),
            ?report,
            "Relayed frame"
        );
        report
    }

    fn recipients(&self, sender: &PeerIdentity) -> Vec<(PeerIdentity, SharedLink)> {
        match self.policy {
            RoutingPolicy::Broadcast => self.registry.all_except(sender).collect(),
            RoutingPolicy::Session => self
                .sessions
                .active_peer(sender)
                .and_then(|peer| {
                    let link = self.registry.lookup(&peer)?;
                    Some((peer, link))
                })
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::PeerLink;
    use crate::application::test_support::{id, RecordingLink};
    use crate::domain::signal::{SignalEnvelope, SignalType};

    fn relay(policy: RoutingPolicy) -> (Arc<ConnectionRegistry>, Arc<CallSessionTable>, AudioRelay) {
        let registry = Arc::new(ConnectionRegistry::new("audio"));
        let sessions = Arc::new(CallSessionTable::new());
        let relay = AudioRelay::new(Arc::clone(&registry), Arc::clone(&sessions), policy);
        (registry, sessions, relay)
    }

    #[test]
    fn fans_out_to_everyone_but_sender() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let alice = RecordingLink::new();
        let bob = RecordingLink::new();
        let carol = RecordingLink::new();
        registry.register(id("alice"), alice.clone()).unwrap();
        registry.register(id("bob"), bob.clone()).unwrap();
        registry.register(id("carol"), carol.clone()).unwrap();

        let pcm: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let report = relay.on_frame(&id("alice"), &AudioFrame::from(pcm.clone()));

        assert_eq!(report.delivered, 2);
        assert_eq!(bob.audio(), vec![pcm.clone()]);
        assert_eq!(carol.audio(), vec![pcm]);
        assert!(alice.sent().is_empty());
    }

    #[test]
    fn preserves_per_sender_order() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let bob = RecordingLink::new();
        registry.register(id("alice"), RecordingLink::new()).unwrap();
        registry.register(id("bob"), bob.clone()).unwrap();

        for i in 0..5u8 {
            relay.on_frame(&id("alice"), &AudioFrame::from(vec![i; 8]));
        }

        let firsts: Vec<u8> = bob.audio().iter().map(|f| f[0]).collect();
        assert_eq!(firsts, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn closed_and_failing_links_do_not_block_others() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let closing = RecordingLink::new();
        closing.close();
        let broken = RecordingLink::failing();
        let carol = RecordingLink::new();
        let alice = RecordingLink::new();
        registry.register(id("alice"), alice.clone()).unwrap();
        registry.register(id("bob"), closing).unwrap();
        registry.register(id("dave"), broken).unwrap();
        registry.register(id("carol"), carol.clone()).unwrap();

        let report = relay.on_frame(&id("alice"), &AudioFrame::from(vec![1, 2, 3, 4]));

        assert_eq!(
            report,
            RelayReport {
                delivered: 1,
                skipped: 1,
                failed: 1,
                dropped: 0
            }
        );
        assert_eq!(carol.audio().len(), 1);
        assert!(alice.is_open());
    }

    #[test]
    fn unregistered_peer_is_not_delivered_to() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let bob = RecordingLink::new();
        let carol = RecordingLink::new();
        registry.register(id("bob"), bob.clone()).unwrap();
        registry.register(id("carol"), carol.clone()).unwrap();

        registry.unregister(&id("bob"));
        relay.on_frame(&id("alice"), &AudioFrame::from(vec![9; 4]));

        assert!(bob.audio().is_empty());
        assert_eq!(carol.audio().len(), 1);
    }

    #[test]
    fn unregister_during_fan_out_keeps_delivering() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let bob = RecordingLink::new();
        let carol = RecordingLink::new();
        let dave = RecordingLink::new();
        {
            let registry = Arc::clone(&registry);
            let bob_id = bob.id();
            let carol_id = carol.id();
            dave.on_send(move || {
                registry.unregister_link(&id("bob"), bob_id);
                registry.unregister_link(&id("carol"), carol_id);
            });
        }
        registry.register(id("alice"), RecordingLink::new()).unwrap();
        registry.register(id("bob"), bob.clone()).unwrap();
        registry.register(id("carol"), carol.clone()).unwrap();
        registry.register(id("dave"), dave.clone()).unwrap();

        let report = relay.on_frame(&id("alice"), &AudioFrame::from(vec![3; 16]));

        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(bob.audio(), vec![vec![3; 16]]);
        assert_eq!(carol.audio(), vec![vec![3; 16]]);
        assert_eq!(dave.audio(), vec![vec![3; 16]]);
        assert_eq!(registry.identities(), vec![id("alice"), id("dave")]);
    }

    #[test]
    fn re_registered_identity_routes_to_new_link_only() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let old = RecordingLink::new();
        let new = RecordingLink::new();
        registry.register(id("bob"), old.clone()).unwrap();
        registry.register(id("bob"), new.clone()).unwrap();

        relay.on_frame(&id("alice"), &AudioFrame::from(vec![5; 4]));

        assert!(old.audio().is_empty());
        assert_eq!(new.audio().len(), 1);
    }

    #[test]
    fn frame_after_peer_left_has_no_recipients() {
        let (registry, _, relay) = relay(RoutingPolicy::Broadcast);
        let alice = RecordingLink::new();
        registry.register(id("alice"), alice.clone()).unwrap();
        registry.register(id("bob"), RecordingLink::new()).unwrap();
        registry.unregister_link(&id("alice"), alice.id());

        let report = relay.on_frame(&id("bob"), &AudioFrame::from(vec![0; 4]));
        assert_eq!(report.recipients(), 0);
    }

    #[test]
    fn session_policy_only_reaches_active_counterpart() {
        let (registry, sessions, relay) = relay(RoutingPolicy::Session);
        let bob = RecordingLink::new();
        let carol = RecordingLink::new();
        registry.register(id("alice"), RecordingLink::new()).unwrap();
        registry.register(id("bob"), bob.clone()).unwrap();
        registry.register(id("carol"), carol.clone()).unwrap();

        // Ringing is not enough.
        sessions.apply(&SignalEnvelope::new(id("alice"), id("bob"), SignalType::CallOffer));
        assert_eq!(relay.on_frame(&id("alice"), &AudioFrame::from(vec![1; 4])).recipients(), 0);

        sessions.apply(&SignalEnvelope::new(id("bob"), id("alice"), SignalType::CallAccept));
        let report = relay.on_frame(&id("alice"), &AudioFrame::from(vec![2; 4]));

        assert_eq!(report.delivered, 1);
        assert_eq!(bob.audio(), vec![vec![2; 4]]);
        assert!(carol.audio().is_empty());
    }

    #[test]
    fn parses_routing_policy() {
        assert_eq!("broadcast".parse(), Ok(RoutingPolicy::Broadcast));
        assert_eq!("Session".parse(), Ok(RoutingPolicy::Session));
        assert!("mesh".parse::<RoutingPolicy>().is_err());
    }
}
