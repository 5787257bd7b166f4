//! Decides, per entity scope and operation, the exact topic, payload and
//! publish settings each protocol message goes out with.

use sparkbus_transport::LastWill;
use sparkbus_types::constants::{SPBV10, STATE_OFFLINE, STATE_ONLINE};
use sparkbus_types::payload::{DynPayloadCodec, Payload, PayloadMetric};
use sparkbus_types::topic::{MessageType, QoS, TopicAddress};
use sparkbus_types::utils::timestamp;
use sparkbus_types::MetricValue;

use crate::error::PublishError;
use crate::state::{EntityId, EntityState};

/// Lifecycle operations an entity can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Birth,
    Data,
    Death,
    Command,
}

/// Everything the transport needs for one outbound protocol message.
#[derive(Debug)]
pub struct OutboundMessage {
    pub topic: TopicAddress,
    pub payload: Payload,
    pub qos: QoS,
    pub retain: bool,
}

/// The message type `operation` maps to for this identity's scope.
pub fn message_type_for(id: &EntityId, operation: Operation) -> MessageType {
    match (operation, id.is_device()) {
        (Operation::Birth, false) => MessageType::NBirth,
        (Operation::Birth, true) => MessageType::DBirth,
        (Operation::Data, false) => MessageType::NData,
        (Operation::Data, true) => MessageType::DData,
        (Operation::Death, false) => MessageType::NDeath,
        (Operation::Death, true) => MessageType::DDeath,
        (Operation::Command, false) => MessageType::NCmd,
        (Operation::Command, true) => MessageType::DCmd,
    }
}

/// Build the topic for `operation` on an identity that was validated at
/// registration. Scope follows the identity, so the pairing is always legal.
pub fn topic_for(id: &EntityId, operation: Operation) -> TopicAddress {
    TopicAddress {
        namespace: SPBV10.to_string(),
        domain: id.domain.clone(),
        message_type: message_type_for(id, operation),
        node_id: id.node_id.clone(),
        device_id: id.device_id.clone(),
    }
}

/// BIRTH: requires a non-empty entity; carries the full snapshot of all three
/// stores.
pub fn birth_message(state: &EntityState, retain: bool) -> Result<OutboundMessage, PublishError> {
    if state.is_empty() {
        return Err(PublishError::EmptyEntity);
    }
    let topic = topic_for(state.id(), Operation::Birth);
    let (qos, _) = topic.publish_quality_retain();
    Ok(OutboundMessage {
        payload: Payload::new(timestamp(), state.birth_snapshot()),
        topic,
        qos,
        retain,
    })
}

/// DATA: requires a non-empty entity and a published birth; carries the dirty
/// subset of the data store unless `send_all`.
pub fn data_message(state: &EntityState, send_all: bool) -> Result<OutboundMessage, PublishError> {
    if state.is_empty() {
        return Err(PublishError::EmptyEntity);
    }
    if state.birth_required() {
        return Err(PublishError::BirthRequired);
    }
    if !send_all && !state.data.is_updated() {
        return Err(PublishError::NoUpdates);
    }
    let topic = topic_for(state.id(), Operation::Data);
    let (qos, retain) = topic.publish_quality_retain();
    Ok(OutboundMessage {
        payload: Payload::new(timestamp(), state.data_snapshot(send_all)),
        topic,
        qos,
        retain,
    })
}

/// DEATH: the codec's minimal offline marker.
pub fn death_message(id: &EntityId, codec: &DynPayloadCodec) -> OutboundMessage {
    let topic = topic_for(id, Operation::Death);
    let (qos, retain) = topic.publish_quality_retain();
    OutboundMessage {
        payload: codec.death_payload(timestamp()),
        topic,
        qos,
        retain,
    }
}

fn command_message(
    topic: TopicAddress,
    commands: Vec<(String, MetricValue)>,
) -> Result<OutboundMessage, PublishError> {
    if commands.is_empty() {
        return Err(PublishError::NoCommands);
    }
    let stamp = timestamp();
    let metrics = commands
        .into_iter()
        .map(|(name, value)| PayloadMetric::new(name, value).with_timestamp(stamp))
        .collect();
    let (qos, retain) = topic.publish_quality_retain();
    Ok(OutboundMessage {
        payload: Payload::new(stamp, metrics),
        topic,
        qos,
        retain,
    })
}

/// DCMD to a named device: a one-shot metric list built from the argument,
/// never from entity state.
pub fn device_command_message(
    domain: &str,
    node_id: &str,
    device_id: &str,
    commands: Vec<(String, MetricValue)>,
) -> Result<OutboundMessage, PublishError> {
    command_message(
        topic_for(
            &EntityId::device(domain, node_id, device_id),
            Operation::Command,
        ),
        commands,
    )
}

/// NCMD to a named node.
pub fn node_command_message(
    domain: &str,
    node_id: &str,
    commands: Vec<(String, MetricValue)>,
) -> Result<OutboundMessage, PublishError> {
    command_message(
        topic_for(&EntityId::node(domain, node_id), Operation::Command),
        commands,
    )
}

/// STATE announcement: a raw string body, never codec encoded.
pub fn state_message(id: &EntityId, online: bool) -> (TopicAddress, &'static str) {
    let topic = TopicAddress {
        namespace: SPBV10.to_string(),
        domain: id.domain.clone(),
        message_type: MessageType::State,
        node_id: id.node_id.clone(),
        device_id: None,
    };
    let body = if online { STATE_ONLINE } else { STATE_OFFLINE };
    (topic, body)
}

/// The entity's DEATH as a transport level last will.
pub fn death_last_will(id: &EntityId, codec: &DynPayloadCodec) -> LastWill {
    let message = death_message(id, codec);
    LastWill {
        topic: message.topic.to_string(),
        payload: codec.encode(&message.payload),
        qos: message.qos,
        retain: message.retain,
    }
}

/// The SCADA STATE `OFFLINE` announcement as a transport level last will.
pub fn state_last_will(id: &EntityId) -> LastWill {
    let (topic, body) = state_message(id, false);
    let (qos, retain) = topic.publish_quality_retain();
    LastWill {
        topic: topic.to_string(),
        payload: body.as_bytes().to_vec().into(),
        qos,
        retain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_node_state() -> EntityState {
        let mut state = EntityState::new(EntityId::node("T", "N"));
        state.data.set_value("speed", 4.2).unwrap();
        state.attributes.set_value("model", "m1").unwrap();
        state
    }

    #[test]
    fn birth_requires_metrics() {
        let state = EntityState::new(EntityId::node("T", "N"));
        assert!(matches!(
            birth_message(&state, false),
            Err(PublishError::EmptyEntity)
        ));
    }

    #[test]
    fn birth_carries_full_snapshot() {
        let state = populated_node_state();
        let message = birth_message(&state, true).unwrap();
        assert_eq!(message.topic.to_string(), "spBv1.0/T/NBIRTH/N");
        assert_eq!(message.payload.metrics.len(), 2);
        assert!(message.retain);
    }

    #[test]
    fn data_requires_birth_first() {
        let state = populated_node_state();
        assert!(matches!(
            data_message(&state, false),
            Err(PublishError::BirthRequired)
        ));
    }

    #[test]
    fn data_requires_updates_unless_send_all() {
        let mut state = populated_node_state();
        state.mark_birth_published();
        state.data.clear_dirty();
        assert!(matches!(
            data_message(&state, false),
            Err(PublishError::NoUpdates)
        ));
        let message = data_message(&state, true).unwrap();
        assert_eq!(message.topic.to_string(), "spBv1.0/T/NDATA/N");
        assert_eq!(message.payload.metrics.len(), 1);
    }

    #[test]
    fn data_carries_dirty_subset() {
        let mut state = populated_node_state();
        state.mark_birth_published();
        state.data.clear_dirty();
        state.data.set_value("rpm", 900_i32).unwrap();
        let message = data_message(&state, false).unwrap();
        let names: Vec<String> = message
            .payload
            .metrics
            .into_iter()
            .map(|metric| metric.name)
            .collect();
        assert_eq!(names, vec!["rpm"]);
    }

    #[test]
    fn device_command_topic_and_rejection() {
        assert!(matches!(
            device_command_message("T", "N", "D", Vec::new()),
            Err(PublishError::NoCommands)
        ));
        let message = device_command_message(
            "T",
            "N",
            "D",
            vec![("relay".to_string(), true.into())],
        )
        .unwrap();
        assert_eq!(message.topic.to_string(), "spBv1.0/T/DCMD/N/D");
        assert_eq!(message.payload.metrics.len(), 1);
    }

    #[test]
    fn state_message_bodies() {
        let id = EntityId::node("T", "scada1");
        let (topic, body) = state_message(&id, true);
        assert_eq!(topic.to_string(), "spBv1.0/T/STATE/scada1");
        assert_eq!(body, "ONLINE");
        let (_, body) = state_message(&id, false);
        assert_eq!(body, "OFFLINE");
    }
}
