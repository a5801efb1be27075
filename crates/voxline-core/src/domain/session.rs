//! Call-session value types.
//!
//! Pure data. The state machine driving them lives in
//! [`crate::application::sessions`].

use std::fmt;
use std::time::{Duration, Instant};

use super::identity::PeerIdentity;

/// Lifecycle of a call between two peers. `Ended` is terminal; a new call
/// always starts a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    Idle,
    Ringing,
    Active,
    Ended,
}

impl CallState {
    /// Ringing and active sessions occupy both of their peers.
    pub fn is_engaged(self) -> bool {
        matches!(self, Self::Ringing | Self::Active)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Active => "active",
            Self::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Unordered pair of identities: `SessionKey::new(a, b) == SessionKey::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    low: PeerIdentity,
    high: PeerIdentity,
}

impl SessionKey {
    pub fn new(a: PeerIdentity, b: PeerIdentity) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn contains(&self, identity: &PeerIdentity) -> bool {
        &self.low == identity || &self.high == identity
    }

    /// The member that is not `identity`, if `identity` is a member.
    pub fn other(&self, identity: &PeerIdentity) -> Option<&PeerIdentity> {
        if &self.low == identity {
            Some(&self.high)
        } else if &self.high == identity {
            Some(&self.low)
        } else {
            None
        }
    }

    pub fn members(&self) -> [&PeerIdentity; 2] {
        [&self.low, &self.high]
    }
}

/// A call between `caller` and `callee`.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub caller: PeerIdentity,
    pub callee: PeerIdentity,
    pub state: CallState,
    pub offered_at: Instant,
    pub answered_at: Option<Instant>,
}

impl CallSession {
    pub fn ringing(caller: PeerIdentity, callee: PeerIdentity) -> Self {
        Self {
            caller,
            callee,
            state: CallState::Ringing,
            offered_at: Instant::now(),
            answered_at: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.caller.clone(), self.callee.clone())
    }

    /// Time spent talking, zero if the call was never answered.
    pub fn talk_time(&self) -> Duration {
        self.answered_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}
