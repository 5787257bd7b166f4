//! Part of [sparkbus](https://github.com/sparkbus/sparkbus), an entity state
//! and message routing layer for Sparkplug-style publish/subscribe telemetry.
//!
//! A [PayloadCodec] implementation that encodes payloads as UTF-8 JSON
//! documents. Metric lists serialize as
//! `{"timestamp": 1, "metrics": [{"name": "...", "type": "...", "value": ..., "timestamp": 1}]}`;
//! the death marker is the same document with an empty metric list.

use bytes::Bytes;
use sparkbus_types::payload::{DecodeError, Payload, PayloadCodec};

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadCodec for JsonCodec {
    fn encode(&self, payload: &Payload) -> Bytes {
        // the payload model contains nothing serde_json can reject
        serde_json::to_vec(payload)
            .expect("payload model serializes infallibly")
            .into()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Payload, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}
