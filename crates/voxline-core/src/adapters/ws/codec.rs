//! JSON-based SignalCodec implementation.

use crate::application::ports::{SignalCodec, SignalCodecError};
use crate::domain::signal::SignalEnvelope;

/// Encodes / decodes [`SignalEnvelope`] as JSON text (via `serde_json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSignalCodec;

impl SignalCodec for JsonSignalCodec {
    fn encode(&self, envelope: &SignalEnvelope) -> Result<String, SignalCodecError> {
        serde_json::to_string(envelope).map_err(|e| SignalCodecError::Encode(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<SignalEnvelope, SignalCodecError> {
        serde_json::from_str(text).map_err(|e| SignalCodecError::Malformed(e.to_string()))
    }
}
