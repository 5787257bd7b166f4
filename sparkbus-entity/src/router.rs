use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::join_all;
use log::{debug, info, warn};
use sparkbus_transport::{
    ConnectError, ConnectOptions, DynEventLoop, DynTransport, TransportEvent,
};
use sparkbus_types::constants::NODE_CONTROL_REBIRTH;
use sparkbus_types::payload::DynPayloadCodec;
use sparkbus_types::topic::{MessageType, TopicAddress};
use sparkbus_types::utils::validate_name;

use crate::entity::{
    ApplicationEntity, DecodedInbound, DeviceEntity, EdgeNodeEntity, EntityInner, EntityKind,
    EntityOptions, ScadaEntity,
};
use crate::error::RegistrationError;
use crate::lifecycle;
use crate::state::EntityId;

/// Demultiplexes one shared transport connection onto registered entities.
///
/// The router owns the only transport handle in the process. Entities are
/// created through the `register_*` constructors, which ties their listener
/// registration to their construction; `unregister` removes the mapping so a
/// discarded entity is never dispatched to again.
pub struct MessageRouter {
    transport: Arc<DynTransport>,
    codec: Arc<DynPayloadCodec>,
    entities: Mutex<HashMap<EntityId, Arc<EntityInner>>>,
}

impl MessageRouter {
    pub fn new(transport: Arc<DynTransport>, codec: Arc<DynPayloadCodec>) -> Self {
        Self {
            transport,
            codec,
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// Open the shared connection, blocking until the broker accepts or the
    /// configured timeout elapses.
    pub async fn connect(&self, options: ConnectOptions) -> Result<(), ConnectError> {
        self.transport.connect(options).await
    }

    pub async fn disconnect(&self) {
        _ = self.transport.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn validate_id(id: &EntityId) -> Result<(), RegistrationError> {
        validate_name(&id.domain).map_err(RegistrationError::InvalidName)?;
        validate_name(&id.node_id).map_err(RegistrationError::InvalidName)?;
        if let Some(device_id) = &id.device_id {
            validate_name(device_id).map_err(RegistrationError::InvalidName)?;
        }
        Ok(())
    }

    fn register(
        &self,
        kind: EntityKind,
        id: EntityId,
        options: EntityOptions,
    ) -> Result<Arc<EntityInner>, RegistrationError> {
        Self::validate_id(&id)?;
        let mut entities = self.entities.lock().unwrap();
        if entities.contains_key(&id) {
            return Err(RegistrationError::Duplicate);
        }
        let inner = Arc::new(EntityInner::new(
            id.clone(),
            kind,
            options.clone(),
            self.transport.clone(),
            self.codec.clone(),
        ));
        if kind == EntityKind::EdgeNode && options.include_rebirth {
            // the store is empty at this point, the write cannot fail
            let _ = inner
                .state
                .lock()
                .unwrap()
                .commands
                .set_value(NODE_CONTROL_REBIRTH, false);
        }
        if options.register_last_will {
            let will = match kind {
                EntityKind::Scada => lifecycle::state_last_will(&id),
                _ => lifecycle::death_last_will(&id, self.codec.as_ref()),
            };
            self.transport.set_last_will(will);
        }
        entities.insert(id.clone(), inner.clone());
        info!("{id} - registered {kind:?} entity");
        Ok(inner)
    }

    /// Register a device entity under a node.
    pub fn register_device(
        &self,
        domain: &str,
        node_id: &str,
        device_id: &str,
        options: EntityOptions,
    ) -> Result<DeviceEntity, RegistrationError> {
        let inner = self.register(
            EntityKind::Device,
            EntityId::device(domain, node_id, device_id),
            options,
        )?;
        Ok(DeviceEntity::from_inner(inner))
    }

    /// Register an edge node entity.
    pub fn register_edge_node(
        &self,
        domain: &str,
        node_id: &str,
        options: EntityOptions,
    ) -> Result<EdgeNodeEntity, RegistrationError> {
        let inner = self.register(EntityKind::EdgeNode, EntityId::node(domain, node_id), options)?;
        Ok(EdgeNodeEntity::from_inner(inner))
    }

    /// Register a generic listening application.
    pub fn register_application(
        &self,
        domain: &str,
        node_id: &str,
        options: EntityOptions,
    ) -> Result<ApplicationEntity, RegistrationError> {
        let inner = self.register(
            EntityKind::Application,
            EntityId::node(domain, node_id),
            options,
        )?;
        Ok(ApplicationEntity::from_inner(inner))
    }

    /// Register the SCADA application entity.
    pub fn register_scada(
        &self,
        domain: &str,
        scada_id: &str,
        options: EntityOptions,
    ) -> Result<ScadaEntity, RegistrationError> {
        let inner = self.register(EntityKind::Scada, EntityId::node(domain, scada_id), options)?;
        Ok(ScadaEntity::from_inner(inner))
    }

    /// Remove an entity's registration. No dispatch happens for it after
    /// this returns.
    pub fn unregister(&self, id: &EntityId) {
        if self.entities.lock().unwrap().remove(id).is_some() {
            info!("{id} - unregistered entity");
        }
    }

    /// Snapshot the registry so callbacks can re-enter the router while the
    /// fan-out is in flight.
    fn snapshot_entities(&self) -> Vec<Arc<EntityInner>> {
        self.entities.lock().unwrap().values().cloned().collect()
    }

    /// Run the dispatch loop until the event loop shuts down.
    ///
    /// Inbound messages are delivered to listeners in arrival order, one at a
    /// time. A malformed topic or payload drops that message and nothing
    /// else.
    pub async fn run(&self, mut event_loop: Box<DynEventLoop>) {
        info!("message router running");
        while let Some(event) = event_loop.poll().await {
            match event {
                TransportEvent::Connected => self.handle_connected().await,
                TransportEvent::Disconnected => self.handle_disconnected(),
                TransportEvent::Message { topic, payload } => {
                    self.handle_message(topic, payload).await
                }
            }
        }
        info!("message router stopped");
    }

    async fn handle_connected(&self) {
        info!("transport connected");
        let entities = self.snapshot_entities();
        join_all(entities.iter().map(|entity| entity.handle_connect())).await;
    }

    fn handle_disconnected(&self) {
        info!("transport disconnected");
        for entity in self.snapshot_entities() {
            entity.handle_disconnect();
        }
    }

    async fn handle_message(&self, topic: String, payload: Bytes) {
        let address: TopicAddress = match topic.parse() {
            Ok(address) => address,
            Err(e) => {
                warn!("dropping message on unparseable topic {topic:?}: {e}");
                return;
            }
        };
        let inbound = if address.message_type == MessageType::State {
            match String::from_utf8(payload.to_vec()) {
                Ok(body) => DecodedInbound::State(body),
                Err(_) => {
                    warn!("dropping STATE message with non utf-8 body on {topic}");
                    return;
                }
            }
        } else {
            match self.codec.decode(&payload) {
                Ok(decoded) => DecodedInbound::Payload(decoded),
                Err(e) => {
                    warn!("dropping undecodable payload on {topic}: {e}");
                    return;
                }
            }
        };
        let mut delivered = false;
        for entity in self.snapshot_entities() {
            if !entity.matches_topic(&topic) {
                continue;
            }
            entity.deliver(&topic, &address, &inbound).await;
            delivered = true;
        }
        if !delivered {
            debug!("no listener for message on {topic}");
        }
    }
}
