//! Call-session state machine: the authoritative record of who is calling
//! whom.
//!
//! Sessions are keyed by the unordered pair of identities. A peer is in at
//! most one ringing/active session; ended sessions are discarded, so a new
//! call between the same pair starts fresh.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info};

use crate::domain::identity::PeerIdentity;
use crate::domain::session::{CallSession, CallState, SessionKey};
use crate::domain::signal::{SignalEnvelope, SignalType};

/// What the relay should do with a signal after applying it.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// Deliver `envelope` to its recipient; the session is now in `state`.
    Forward {
        envelope: SignalEnvelope,
        state: CallState,
    },
    /// The offer cannot ring; send `reply` back to the caller.
    Busy { reply: SignalEnvelope },
    /// Dropped without a state change.
    Ignored { reason: IgnoreReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `from` and `to` are the same identity.
    SelfAddressed,
    /// The caller repeated an offer it already placed.
    DuplicateOffer,
    /// No session exists for the pair.
    NoSession,
    /// The session is not in a state that accepts this signal.
    WrongState(CallState),
    /// Only the callee may accept.
    NotCallee,
    /// `busy` is emitted by the relay, never accepted from clients.
    RelayOnly,
}

#[derive(Debug, Default)]
struct SessionState {
    sessions: HashMap<SessionKey, CallSession>,
    by_peer: HashMap<PeerIdentity, SessionKey>,
}

impl SessionState {
    fn insert(&mut self, session: CallSession) {
        let key = session.key();
        self.by_peer.insert(session.caller.clone(), key.clone());
        self.by_peer.insert(session.callee.clone(), key.clone());
        self.sessions.insert(key, session);
    }

    fn remove(&mut self, key: &SessionKey) -> Option<CallSession> {
        let session = self.sessions.remove(key)?;
        for member in key.members() {
            if self.by_peer.get(member) == Some(key) {
                self.by_peer.remove(member);
            }
        }
        Some(session)
    }
}

/// Keyed table of call sessions.
#[derive(Debug, Default)]
pub struct CallSessionTable {
    state: Mutex<SessionState>,
}

impl CallSessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one signal and decide what to do with it.
    pub fn apply(&self, envelope: &SignalEnvelope) -> SignalOutcome {
        if envelope.from == envelope.to {
            return ignored(envelope, IgnoreReason::SelfAddressed);
        }
        match envelope.signal_type {
            SignalType::CallOffer => self.offer(envelope),
            SignalType::CallAccept => self.accept(envelope),
            SignalType::CallReject => self.end(envelope, |state| state == CallState::Ringing),
            SignalType::Hangup => self.end(envelope, CallState::is_engaged),
            SignalType::Busy => ignored(envelope, IgnoreReason::RelayOnly),
        }
    }

    fn offer(&self, envelope: &SignalEnvelope) -> SignalOutcome {
        let key = SessionKey::new(envelope.from.clone(), envelope.to.clone());
        let mut state = self.lock();

        if state.sessions.get(&key).is_some_and(|s| s.caller == envelope.from) {
            return ignored(envelope, IgnoreReason::DuplicateOffer);
        }
        if state.by_peer.contains_key(&envelope.from) || state.by_peer.contains_key(&envelope.to) {
            info!(caller = %envelope.from, callee = %envelope.to, "Offer refused, peer busy");
            return SignalOutcome::Busy {
                reply: SignalEnvelope::busy(envelope.to.clone(), envelope.from.clone()),
            };
        }

        state.insert(CallSession::ringing(envelope.from.clone(), envelope.to.clone()));
        info!(caller = %envelope.from, callee = %envelope.to, "Call ringing");
        forward(envelope, CallState::Ringing)
    }

    fn accept(&self, envelope: &SignalEnvelope) -> SignalOutcome {
        let key = SessionKey::new(envelope.from.clone(), envelope.to.clone());
        let mut state = self.lock();

        let Some(session) = state.sessions.get_mut(&key) else {
            return ignored(envelope, IgnoreReason::NoSession);
        };
        if session.state != CallState::Ringing {
            let current = session.state;
            return ignored(envelope, IgnoreReason::WrongState(current));
        }
        if session.callee != envelope.from {
            return ignored(envelope, IgnoreReason::NotCallee);
        }

        session.state = CallState::Active;
        session.answered_at = Some(Instant::now());
        info!(
            caller = %session.caller,
            callee = %session.callee,
            ring_ms = session.offered_at.elapsed().as_millis() as u64,
            "Call active"
        );
        forward(envelope, CallState::Active)
    }

    /// `call-reject` and `hangup`: end the session if `allowed(state)`.
    fn end(&self, envelope: &SignalEnvelope, allowed: impl Fn(CallState) -> bool) -> SignalOutcome {
        let key = SessionKey::new(envelope.from.clone(), envelope.to.clone());
        let mut state = self.lock();

        let Some(current) = state.sessions.get(&key).map(|s| s.state) else {
            return ignored(envelope, IgnoreReason::NoSession);
        };
        if !allowed(current) {
            return ignored(envelope, IgnoreReason::WrongState(current));
        }

        if let Some(session) = state.remove(&key) {
            info!(
                by = %envelope.from,
                signal = %envelope.signal_type,
                talk_ms = session.talk_time().as_millis() as u64,
                "Call ended"
            );
        }
        forward(envelope, CallState::Ended)
    }

    /// Current state of the pair's call; `Idle` when there is none.
    pub fn state(&self, a: &PeerIdentity, b: &PeerIdentity) -> CallState {
        let key = SessionKey::new(a.clone(), b.clone());
        self.lock()
            .sessions
            .get(&key)
            .map_or(CallState::Idle, |s| s.state)
    }

    /// The ringing or active session `identity` takes part in.
    pub fn session_of(&self, identity: &PeerIdentity) -> Option<CallSession> {
        let state = self.lock();
        let key = state.by_peer.get(identity)?;
        state.sessions.get(key).cloned()
    }

    /// Counterpart of `identity` in an active call.
    pub fn active_peer(&self, identity: &PeerIdentity) -> Option<PeerIdentity> {
        let state = self.lock();
        let key = state.by_peer.get(identity)?;
        let session = state.sessions.get(key)?;
        if session.state != CallState::Active {
            return None;
        }
        key.other(identity).cloned()
    }

    /// Discard the pair's session without signaling anyone.
    pub fn discard(&self, a: &PeerIdentity, b: &PeerIdentity) -> bool {
        let key = SessionKey::new(a.clone(), b.clone());
        self.lock().remove(&key).is_some()
    }

    /// End every session `identity` takes part in (it went away), returning
    /// a `hangup` from it to each counterpart.
    pub fn end_all_for(&self, identity: &PeerIdentity) -> Vec<SignalEnvelope> {
        let mut state = self.lock();
        let Some(key) = state.by_peer.get(identity).cloned() else {
            return Vec::new();
        };
        state.remove(&key);
        match key.other(identity) {
            Some(other) => {
                info!(%identity, peer = %other, "Call ended by disconnect");
                vec![SignalEnvelope::hangup(identity.clone(), other.clone())]
            }
            None => Vec::new(),
        }
    }

    /// Number of ringing or active sessions.
    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn forward(envelope: &SignalEnvelope, state: CallState) -> SignalOutcome {
    SignalOutcome::Forward {
        envelope: envelope.clone(),
        state,
    }
}

fn ignored(envelope: &SignalEnvelope, reason: IgnoreReason) -> SignalOutcome {
    debug!(from = %envelope.from, to = %envelope.to, signal = %envelope.signal_type, ?reason, "Signal ignored");
    SignalOutcome::Ignored { reason }
}
