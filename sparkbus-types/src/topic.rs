use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::constants::{
    DBIRTH, DCMD, DDATA, DDEATH, NBIRTH, NCMD, NDATA, NDEATH, SPBV10, STATE,
};
use crate::utils::validate_name;

/// The kind of protocol message a topic addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    NBirth,
    NData,
    NDeath,
    NCmd,
    DBirth,
    DData,
    DDeath,
    DCmd,
    State,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::NBirth => NBIRTH,
            MessageType::NData => NDATA,
            MessageType::NDeath => NDEATH,
            MessageType::NCmd => NCMD,
            MessageType::DBirth => DBIRTH,
            MessageType::DData => DDATA,
            MessageType::DDeath => DDEATH,
            MessageType::DCmd => DCMD,
            MessageType::State => STATE,
        }
    }

    /// Device scoped message types carry a device id as the fifth topic segment.
    pub fn is_device_scoped(&self) -> bool {
        matches!(
            self,
            MessageType::DBirth | MessageType::DData | MessageType::DDeath | MessageType::DCmd
        )
    }

    pub fn is_command(&self) -> bool {
        matches!(self, MessageType::NCmd | MessageType::DCmd)
    }

    fn from_segment(segment: &str) -> Option<MessageType> {
        let message_type = match segment {
            NBIRTH => MessageType::NBirth,
            NDATA => MessageType::NData,
            NDEATH => MessageType::NDeath,
            NCMD => MessageType::NCmd,
            DBIRTH => MessageType::DBirth,
            DDATA => MessageType::DData,
            DDEATH => MessageType::DDeath,
            DCMD => MessageType::DCmd,
            STATE => MessageType::State,
            _ => return None,
        };
        Some(message_type)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when constructing a topic from mismatched components.
#[derive(Error, Debug, PartialEq)]
pub enum TopicConfigError {
    #[error("{0} topics require a device id")]
    DeviceIdRequired(MessageType),
    #[error("{0} topics do not take a device id")]
    DeviceIdNotAllowed(MessageType),
    #[error("invalid topic segment: {0}")]
    InvalidSegment(String),
}

/// Errors raised when parsing an inbound topic string.
#[derive(Error, Debug, PartialEq)]
pub enum TopicParseError {
    #[error("expected 4 or 5 topic segments, got {0}")]
    SegmentCount(usize),
    #[error("unknown message type segment {0:?}")]
    UnknownMessageType(String),
    #[error("topic contains an empty segment")]
    EmptySegment,
    #[error("node scoped message type {0} followed by a device id")]
    UnexpectedDeviceId(MessageType),
    #[error("device scoped message type {0} missing a device id")]
    MissingDeviceId(MessageType),
}

/// A topic in the fixed namespace grammar
/// `namespace/domain/message_type/node_id[/device_id]`.
///
/// Built from components on the publish path and parsed from the wire on the
/// subscribe path; the two directions round trip losslessly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicAddress {
    pub namespace: String,
    pub domain: String,
    pub message_type: MessageType,
    pub node_id: String,
    pub device_id: Option<String>,
}

impl TopicAddress {
    /// Build a topic under the [SPBV10] namespace.
    ///
    /// Fails if `device_id` is present for a node scoped message type, absent
    /// for a device scoped one, or if any segment contains topic syntax
    /// characters.
    pub fn new(
        domain: &str,
        message_type: MessageType,
        node_id: &str,
        device_id: Option<&str>,
    ) -> Result<Self, TopicConfigError> {
        validate_name(domain).map_err(TopicConfigError::InvalidSegment)?;
        validate_name(node_id).map_err(TopicConfigError::InvalidSegment)?;
        if let Some(device_id) = device_id {
            validate_name(device_id).map_err(TopicConfigError::InvalidSegment)?;
        }
        match (message_type.is_device_scoped(), device_id) {
            (true, None) => Err(TopicConfigError::DeviceIdRequired(message_type)),
            (false, Some(_)) => Err(TopicConfigError::DeviceIdNotAllowed(message_type)),
            _ => Ok(Self {
                namespace: SPBV10.to_string(),
                domain: domain.to_string(),
                message_type,
                node_id: node_id.to_string(),
                device_id: device_id.map(str::to_string),
            }),
        }
    }

    pub fn node(domain: &str, message_type: MessageType, node_id: &str) -> Result<Self, TopicConfigError> {
        Self::new(domain, message_type, node_id, None)
    }

    pub fn device(
        domain: &str,
        message_type: MessageType,
        node_id: &str,
        device_id: &str,
    ) -> Result<Self, TopicConfigError> {
        Self::new(domain, message_type, node_id, Some(device_id))
    }

    /// The [QoS] and retain settings a message on this topic should be
    /// published with. Birth retention is decided by the publishing entity and
    /// may override the default here.
    pub fn publish_quality_retain(&self) -> (QoS, bool) {
        match self.message_type {
            MessageType::NBirth | MessageType::DBirth => (QoS::AtMostOnce, false),
            MessageType::NData | MessageType::DData => (QoS::AtMostOnce, false),
            MessageType::NCmd | MessageType::DCmd => (QoS::AtMostOnce, false),
            MessageType::NDeath | MessageType::DDeath => (QoS::AtLeastOnce, false),
            MessageType::State => (QoS::AtLeastOnce, true),
        }
    }
}

impl fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_id {
            Some(device_id) => write!(
                f,
                "{}/{}/{}/{}/{}",
                self.namespace, self.domain, self.message_type, self.node_id, device_id
            ),
            None => write!(
                f,
                "{}/{}/{}/{}",
                self.namespace, self.domain, self.message_type, self.node_id
            ),
        }
    }
}

impl FromStr for TopicAddress {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('/').collect();
        if segments.len() != 4 && segments.len() != 5 {
            return Err(TopicParseError::SegmentCount(segments.len()));
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(TopicParseError::EmptySegment);
        }
        let message_type = MessageType::from_segment(segments[2])
            .ok_or_else(|| TopicParseError::UnknownMessageType(segments[2].to_string()))?;
        let device_id = segments.get(4).map(|segment| segment.to_string());
        if message_type.is_device_scoped() && device_id.is_none() {
            return Err(TopicParseError::MissingDeviceId(message_type));
        }
        if !message_type.is_device_scoped() && device_id.is_some() {
            return Err(TopicParseError::UnexpectedDeviceId(message_type));
        }
        Ok(Self {
            namespace: segments[0].to_string(),
            domain: segments[1].to_string(),
            message_type,
            node_id: segments[3].to_string(),
            device_id,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// The topic shapes an entity can subscribe to.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterTopic {
    /// One exact topic.
    Address(TopicAddress),
    /// Every STATE announcement in a domain: `namespace/domain/STATE/+`.
    DomainState { domain: String },
    /// Everything published in a domain: `namespace/domain/#`.
    Domain { domain: String },
}

impl FilterTopic {
    pub fn topic_string(&self) -> String {
        match self {
            FilterTopic::Address(address) => address.to_string(),
            FilterTopic::DomainState { domain } => format!("{}/{}/{}/+", SPBV10, domain, STATE),
            FilterTopic::Domain { domain } => format!("{}/{}/#", SPBV10, domain),
        }
    }

    pub fn matches(&self, topic: &str) -> bool {
        filter_matches(&self.topic_string(), topic)
    }
}

/// A subscription request: a filter topic plus the [QoS] to subscribe with.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub topic: FilterTopic,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new(topic: FilterTopic) -> Self {
        Self::new_with_qos(topic, QoS::AtMostOnce)
    }

    pub fn new_with_qos(topic: FilterTopic, qos: QoS) -> Self {
        Self { topic, qos }
    }
}

/// Segment-wise filter matching: `+` matches one segment, `#` the remainder.
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_segments = filter.split('/');
    let mut topic_segments = topic.split('/');
    loop {
        match (filter_segments.next(), topic_segments.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(filter_segment), Some(topic_segment)) => {
                if filter_segment != topic_segment {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
