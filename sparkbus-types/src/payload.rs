use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::{DataType, MetricValue};

/// A single named metric as it travels in a payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayloadMetric {
    pub name: String,
    #[serde(flatten)]
    pub value: MetricValue,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<u64>,
}

impl PayloadMetric {
    pub fn new<S: Into<String>, V: Into<MetricValue>>(name: S, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn datatype(&self) -> DataType {
        self.value.datatype()
    }
}

/// The serializable content of one protocol message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub metrics: Vec<PayloadMetric>,
}

impl Payload {
    pub fn new(timestamp: u64, metrics: Vec<PayloadMetric>) -> Self {
        Self {
            timestamp: Some(timestamp),
            metrics,
        }
    }

    /// The minimal marker payload published when an entity goes offline.
    pub fn death(timestamp: u64) -> Self {
        Self {
            timestamp: Some(timestamp),
            metrics: Vec::new(),
        }
    }
}

/// Error raised when inbound bytes do not form a payload.
///
/// Decoding is all or nothing: a codec must never hand back a truncated
/// metric list.
#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Boundary trait for the payload byte codec.
///
/// The codec owns the wire representation of a metric list; this layer only
/// decides which metrics travel in which message.
pub trait PayloadCodec {
    fn encode(&self, payload: &Payload) -> Bytes;

    fn decode(&self, bytes: &[u8]) -> Result<Payload, DecodeError>;

    /// The distinguished "no metrics / offline" payload used for DEATH
    /// messages and last wills.
    fn death_payload(&self, timestamp: u64) -> Payload {
        Payload::death(timestamp)
    }
}

pub type DynPayloadCodec = dyn PayloadCodec + Send + Sync;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn death_payload_has_no_metrics() {
        let payload = Payload::death(100);
        assert!(payload.metrics.is_empty());
        assert_eq!(payload.timestamp, Some(100));
    }

    #[test]
    fn metric_builder() {
        let metric = PayloadMetric::new("temperature", 21.5).with_timestamp(7);
        assert_eq!(metric.name, "temperature");
        assert_eq!(metric.datatype(), DataType::Float);
        assert_eq!(metric.timestamp, Some(7));
    }

    #[test]
    fn metric_serde_shape() {
        let metric = PayloadMetric::new("setpoint", 5_i32).with_timestamp(7);
        let json = serde_json::to_value(&metric).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "setpoint",
                "type": "integer",
                "value": 5,
                "timestamp": 7,
            })
        );
        let back: PayloadMetric = serde_json::from_value(json).unwrap();
        assert_eq!(back, metric);
    }
}
