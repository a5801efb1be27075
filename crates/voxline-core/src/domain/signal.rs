//! Signaling envelope types.
//!
//! These travel as JSON text frames on the signaling channel.
//! Pure data, no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::PeerIdentity;

// ---------------------------------------------------------------------------
// Signal types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    CallOffer,
    CallAccept,
    CallReject,
    Hangup,
    /// Sent by the relay only, in answer to an offer that cannot ring.
    Busy,
}

impl SignalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallOffer => "call-offer",
            Self::CallAccept => "call-accept",
            Self::CallReject => "call-reject",
            Self::Hangup => "hangup",
            Self::Busy => "busy",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The only envelope `type` the relay understands. Anything else on the
/// signaling channel fails to decode and is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    #[default]
    #[serde(rename = "rtc-signal")]
    RtcSignal,
}

/// `{ "type": "rtc-signal", "from", "to", "signalType", "payload" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub from: PeerIdentity,
    pub to: PeerIdentity,
    pub signal_type: SignalType,
    /// Opaque to the relay; forwarded as received.
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

impl SignalEnvelope {
    pub fn new(from: PeerIdentity, to: PeerIdentity, signal_type: SignalType) -> Self {
        Self {
            kind: EnvelopeKind::RtcSignal,
            from,
            to,
            signal_type,
            payload: empty_payload(),
        }
    }

    /// Relay-originated refusal: `from` is the engaged callee, `to` the caller.
    pub fn busy(callee: PeerIdentity, caller: PeerIdentity) -> Self {
        Self::new(callee, caller, SignalType::Busy)
    }

    pub fn hangup(from: PeerIdentity, to: PeerIdentity) -> Self {
        Self::new(from, to, SignalType::Hangup)
    }
}
