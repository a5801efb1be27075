//! Port traits (interfaces) that use cases depend on.
//!
//! Adapters implement these traits; use cases never reference tungstenite,
//! sockets or serde_json directly.

use std::fmt;

use crate::domain::frame::AudioFrame;
use crate::domain::identity::LinkId;
use crate::domain::signal::SignalEnvelope;

// ---------------------------------------------------------------------------
// PeerLink (one live connection)
// ---------------------------------------------------------------------------

/// A message queued for delivery to one peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Binary audio frame.
    Audio(AudioFrame),
    /// Encoded signaling envelope (text frame).
    Signal(String),
}

/// Result of handing a message to a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Queued,
    /// Queued, but the queue was full and its oldest entry was discarded.
    QueuedDroppedOldest,
}

/// Outbound half of one peer connection.
///
/// `send` never blocks: it hands the message to the link's queue and returns.
pub trait PeerLink: Send + Sync + fmt::Debug {
    fn id(&self) -> LinkId;

    /// False once the link is closing or closed.
    fn is_open(&self) -> bool;

    fn send(&self, msg: Outbound) -> Result<SendStatus, LinkError>;

    /// Close the link. Idempotent. Queued messages are discarded.
    fn close(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link is closed")]
    Closed,
    #[error("outbound queue full ({capacity} messages)")]
    QueueFull { capacity: usize },
}

// ---------------------------------------------------------------------------
// SignalCodec (serialization)
// ---------------------------------------------------------------------------

/// Encodes / decodes signaling envelopes to/from text frames.
pub trait SignalCodec: Send + Sync {
    fn encode(&self, envelope: &SignalEnvelope) -> Result<String, SignalCodecError>;
    fn decode(&self, text: &str) -> Result<SignalEnvelope, SignalCodecError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignalCodecError {
    #[error("malformed signal envelope: {0}")]
    Malformed(String),
    #[error("failed to encode signal envelope: {0}")]
    Encode(String),
}
