//! Peer identities, link identifiers and relay request paths.
//!
//! These are **pure data**: no I/O, no framework dependencies.

use std::borrow::Borrow;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Name a client claims for itself when connecting. Not verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Wrap a claimed name. Empty (or all-whitespace) names are refused.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentityError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(name))
    }

    /// Identity handed to a connection whose request carried none:
    /// `user-<unix millis>-<4 hex digits>`.
    pub fn fallback() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        Self(format!("user-{millis}-{:04x}", rand::random::<u16>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PeerIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PeerIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PeerIdentity> for String {
    fn from(identity: PeerIdentity) -> Self {
        identity.0
    }
}

/// Process-unique id of one transport connection.
///
/// Two connections claiming the same [`PeerIdentity`] always have distinct
/// link ids, which lets teardown of a superseded connection leave its
/// replacement alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("peer identity must not be empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// Request path routing
// ---------------------------------------------------------------------------

/// Which relay channel a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Binary PCM frames, fanned out to other peers.
    Audio,
    /// JSON signaling envelopes, delivered to one recipient.
    Signal,
}

impl Channel {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "audio" => Some(Self::Audio),
            "signal" => Some(Self::Signal),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Signal => f.write_str("signal"),
        }
    }
}

/// Path prefixes accepted in front of the channel segment. `ws` is the
/// prefix older browser clients still dial.
const PATH_PREFIXES: [&str; 2] = ["relay", "ws"];

/// A parsed connection request path: `/relay/{audio|signal}/{identity}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayPath {
    pub channel: Channel,
    pub identity: PeerIdentity,
    /// True when the identity was generated rather than taken from the path.
    pub generated: bool,
}

impl RelayPath {
    /// Parse a request path. Never fails: unknown paths and missing or
    /// undecodable identity segments fall back to the audio channel and a
    /// generated identity respectively.
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let channel = match segments.as_slice() {
            [prefix, kind, ..] if PATH_PREFIXES.contains(prefix) => Channel::from_segment(kind),
            _ => None,
        };

        let Some(channel) = channel else {
            return Self::generated(Channel::Audio);
        };

        let claimed = segments
            .get(2)
            .and_then(|raw| percent_decode_str(raw).decode_utf8().ok())
            .and_then(|name| PeerIdentity::new(name.into_owned()).ok());

        match claimed {
            Some(identity) => Self {
                channel,
                identity,
                generated: false,
            },
            None => Self::generated(channel),
        }
    }

    fn generated(channel: Channel) -> Self {
        Self {
            channel,
            identity: PeerIdentity::fallback(),
            generated: true,
        }
    }
}
