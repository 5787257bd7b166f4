use std::future::Future;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, info, warn};
use sparkbus_transport::DynTransport;
use sparkbus_types::constants::{NODE_CONTROL_REBIRTH, SPBV10};
use sparkbus_types::payload::{DynPayloadCodec, Payload, PayloadMetric};
use sparkbus_types::topic::{FilterTopic, QoS, TopicAddress, TopicFilter};
use sparkbus_types::utils::timestamp;
use sparkbus_types::MetricValue;

use crate::error::PublishError;
use crate::lifecycle::{self, Operation, OutboundMessage};
use crate::state::{EntityId, EntityState};
use crate::store::MetricError;

/// Role of a registered entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Device,
    EdgeNode,
    Application,
    Scada,
}

/// Per-entity registration options.
#[derive(Clone, Debug)]
pub struct EntityOptions {
    /// Publish BIRTH messages with the retain flag.
    pub retain_birth: bool,
    /// Install this entity's DEATH (STATE `OFFLINE` for SCADA) as the
    /// transport last will at registration.
    pub register_last_will: bool,
    /// Pre-register the built-in rebirth command. Edge nodes only.
    pub include_rebirth: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            retain_birth: false,
            register_last_will: false,
            include_rebirth: true,
        }
    }
}

impl EntityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain_birth(mut self, retain: bool) -> Self {
        self.retain_birth = retain;
        self
    }

    pub fn register_last_will(mut self, register: bool) -> Self {
        self.register_last_will = register;
        self
    }

    pub fn include_rebirth(mut self, include: bool) -> Self {
        self.include_rebirth = include;
        self
    }
}

/// What an entity's message callback receives.
#[derive(Clone, Copy, Debug)]
pub enum InboundMessage<'a> {
    /// A decoded metric payload.
    Payload(&'a Payload),
    /// The raw body of a STATE announcement.
    State(&'a str),
}

pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(&TopicAddress, InboundMessage<'_>) + Send + Sync>;
pub type CommandCallback = Arc<dyn Fn(&[PayloadMetric]) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EntityCallbacks {
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    on_message: Option<MessageCallback>,
    on_command: Option<CommandCallback>,
}

/// An inbound message after the router has parsed and decoded it once for
/// every listener.
pub(crate) enum DecodedInbound {
    State(String),
    Payload(Payload),
}

/// State and behaviour shared between a role handle and the router's
/// registry entry for it.
pub(crate) struct EntityInner {
    pub(crate) id: EntityId,
    pub(crate) kind: EntityKind,
    pub(crate) options: EntityOptions,
    pub(crate) state: Mutex<EntityState>,
    pub(crate) callbacks: Mutex<EntityCallbacks>,
    filters: Vec<TopicFilter>,
    /// Topic of the most recent publish, used to suppress transport echo.
    loopback_topic: Mutex<Option<String>>,
    pub(crate) transport: Arc<DynTransport>,
    pub(crate) codec: Arc<DynPayloadCodec>,
}

fn subscription_filters(kind: EntityKind, id: &EntityId) -> Vec<TopicFilter> {
    match kind {
        EntityKind::Device | EntityKind::EdgeNode => vec![
            TopicFilter::new_with_qos(
                FilterTopic::Address(lifecycle::topic_for(id, Operation::Command)),
                QoS::AtLeastOnce,
            ),
            TopicFilter::new_with_qos(
                FilterTopic::DomainState {
                    domain: id.domain.clone(),
                },
                QoS::AtLeastOnce,
            ),
        ],
        EntityKind::Application | EntityKind::Scada => vec![TopicFilter::new(FilterTopic::Domain {
            domain: id.domain.clone(),
        })],
    }
}

impl EntityInner {
    pub(crate) fn new(
        id: EntityId,
        kind: EntityKind,
        options: EntityOptions,
        transport: Arc<DynTransport>,
        codec: Arc<DynPayloadCodec>,
    ) -> Self {
        Self {
            filters: subscription_filters(kind, &id),
            state: Mutex::new(EntityState::new(id.clone())),
            callbacks: Mutex::new(EntityCallbacks::default()),
            loopback_topic: Mutex::new(None),
            id,
            kind,
            options,
            transport,
            codec,
        }
    }

    pub(crate) fn matches_topic(&self, topic: &str) -> bool {
        self.filters.iter().any(|filter| filter.topic.matches(topic))
    }

    fn is_loopback(&self, topic: &str) -> bool {
        self.loopback_topic.lock().unwrap().as_deref() == Some(topic)
    }

    fn connect_callback(&self) -> Option<ConnectCallback> {
        self.callbacks.lock().unwrap().on_connect.clone()
    }

    fn disconnect_callback(&self) -> Option<DisconnectCallback> {
        self.callbacks.lock().unwrap().on_disconnect.clone()
    }

    fn message_callback(&self) -> Option<MessageCallback> {
        self.callbacks.lock().unwrap().on_message.clone()
    }

    fn command_callback(&self) -> Option<CommandCallback> {
        self.callbacks.lock().unwrap().on_command.clone()
    }

    /// Encode and send one outbound message, recording its topic for
    /// loopback suppression.
    async fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        let topic = message.topic.to_string();
        let bytes = self.codec.encode(&message.payload);
        *self.loopback_topic.lock().unwrap() = Some(topic.clone());
        match self
            .transport
            .publish(topic, bytes, message.qos, message.retain)
            .await
        {
            Ok(()) => Ok(()),
            Err(()) => Err(PublishError::NotConnected),
        }
    }

    pub(crate) async fn publish_birth(&self) -> Result<(), PublishError> {
        if !self.transport.is_connected() {
            warn!("{} - birth not published, transport disconnected", self.id);
            return Err(PublishError::NotConnected);
        }
        let (message, revisions) = {
            let state = self.state.lock().unwrap();
            let revisions = (
                state.attributes.revision(),
                state.data.revision(),
                state.commands.revision(),
            );
            (
                lifecycle::birth_message(&state, self.options.retain_birth),
                revisions,
            )
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("{} - birth not published: {e}", self.id);
                return Err(e);
            }
        };
        self.publish(message).await?;
        {
            // the birth flushed the full state, nothing snapshotted is
            // pending anymore
            let mut state = self.state.lock().unwrap();
            state.attributes.clear_dirty_through(revisions.0);
            state.data.clear_dirty_through(revisions.1);
            state.commands.clear_dirty_through(revisions.2);
            state.mark_birth_published();
        }
        info!("{} - published BIRTH", self.id);
        Ok(())
    }

    pub(crate) async fn publish_data(&self, send_all: bool) -> Result<(), PublishError> {
        if !self.transport.is_connected() {
            warn!("{} - data not published, transport disconnected", self.id);
            return Err(PublishError::NotConnected);
        }
        let (message, revision) = {
            let state = self.state.lock().unwrap();
            (lifecycle::data_message(&state, send_all), state.data.revision())
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("{} - data not published: {e}", self.id);
                return Err(e);
            }
        };
        self.publish(message).await?;
        // only clear what was snapshotted; later writes stay dirty
        self.state.lock().unwrap().data.clear_dirty_through(revision);
        debug!("{} - published DATA", self.id);
        Ok(())
    }

    pub(crate) async fn publish_death(&self) -> Result<(), PublishError> {
        if !self.transport.is_connected() {
            warn!("{} - death not published, transport disconnected", self.id);
            return Err(PublishError::NotConnected);
        }
        let message = lifecycle::death_message(&self.id, self.codec.as_ref());
        self.publish(message).await?;
        self.state.lock().unwrap().clear_birth_published();
        info!("{} - published DEATH", self.id);
        Ok(())
    }

    pub(crate) async fn disconnect(&self, skip_death: bool) {
        info!("{} - disconnecting from transport", self.id);
        // a graceful disconnect never triggers the last will, so the death
        // certificate goes out explicitly unless the caller opts out
        if !skip_death && self.publish_death().await.is_err() {
            debug!("{} - could not publish death certificate on disconnect", self.id);
        }
        _ = self.transport.disconnect().await;
    }

    pub(crate) async fn handle_connect(&self) {
        match self.transport.subscribe_many(self.filters.clone()).await {
            Ok(()) => debug!("{} - subscribed to command and state topics", self.id),
            Err(()) => warn!("{} - could not subscribe to command and state topics", self.id),
        }
        if let Some(on_connect) = self.connect_callback() {
            on_connect();
        }
    }

    pub(crate) fn handle_disconnect(&self) {
        self.state.lock().unwrap().clear_birth_published();
        if let Some(on_disconnect) = self.disconnect_callback() {
            on_disconnect();
        }
    }

    fn is_own_command_topic(&self, address: &TopicAddress) -> bool {
        address.message_type.is_command()
            && address.node_id == self.id.node_id
            && address.device_id == self.id.device_id
    }

    pub(crate) async fn deliver(
        &self,
        raw_topic: &str,
        address: &TopicAddress,
        inbound: &DecodedInbound,
    ) {
        if self.is_loopback(raw_topic) {
            debug!("{} - ignoring looped back publish on {raw_topic}", self.id);
            return;
        }
        if address.namespace != SPBV10 || address.domain != self.id.domain {
            return;
        }
        match inbound {
            DecodedInbound::State(body) => {
                if let Some(on_message) = self.message_callback() {
                    on_message(address, InboundMessage::State(body));
                }
            }
            DecodedInbound::Payload(payload) => {
                if let Some(on_message) = self.message_callback() {
                    on_message(address, InboundMessage::Payload(payload));
                }
                if self.is_own_command_topic(address) {
                    self.handle_command(payload).await;
                }
            }
        }
    }

    /// Validate and apply one inbound command payload against the commands
    /// store, then report the applied batch.
    async fn handle_command(&self, payload: &Payload) {
        let mut applied = Vec::new();
        let mut rebirth = false;
        {
            let mut state = self.state.lock().unwrap();
            for metric in &payload.metrics {
                if !state.commands.contains(&metric.name) {
                    warn!("{} - unrecognized command {:?} ignored", self.id, metric.name);
                    continue;
                }
                if state.commands.datatype_of(&metric.name) != Some(metric.value.datatype()) {
                    warn!(
                        "{} - command {:?} has mismatched datatype, ignored",
                        self.id, metric.name
                    );
                    continue;
                }
                let stamp = metric.timestamp.unwrap_or_else(timestamp);
                // declared type already checked, the write cannot fail
                if state
                    .commands
                    .set_value_with_timestamp(&metric.name, metric.value.clone(), stamp)
                    .is_ok()
                {
                    if self.kind == EntityKind::EdgeNode
                        && metric.name == NODE_CONTROL_REBIRTH
                        && metric.value == MetricValue::Boolean(true)
                    {
                        rebirth = true;
                    }
                    applied.push(metric.clone());
                }
            }
            if rebirth {
                // re-arm the command so the next rising edge is a transition
                let _ = state
                    .commands
                    .set_value_with_timestamp(NODE_CONTROL_REBIRTH, false, timestamp());
            }
        }
        if !applied.is_empty() {
            if let Some(on_command) = self.command_callback() {
                on_command(&applied);
            }
        }
        if rebirth {
            info!("{} - rebirth command received", self.id);
            if self.publish_birth().await.is_err() {
                warn!("{} - rebirth requested but birth could not be published", self.id);
            }
        }
    }
}

/// The capability surface shared by every entity role.
pub trait EntityPublisher {
    /// The identity every topic for this entity is built from.
    fn entity_id(&self) -> &EntityId;

    fn is_connected(&self) -> bool;

    /// Announce this entity's full state. Requires a connected transport and
    /// at least one registered metric.
    fn publish_birth(&self) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Publish telemetry. `send_all` forces the full data store out instead
    /// of the dirty subset. Requires a published birth.
    fn publish_data(&self, send_all: bool) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Announce this entity going offline.
    fn publish_death(&self) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Publish the graceful DEATH (unless `skip_death`) and close the shared
    /// transport connection.
    fn disconnect(&self, skip_death: bool) -> impl Future<Output = ()> + Send;
}

/// A leaf entity under a node, owning its own metrics.
#[derive(Clone)]
pub struct DeviceEntity {
    inner: Arc<EntityInner>,
}

/// A gateway-like entity aggregating devices.
///
/// Carries the built-in rebirth command and can address commands at its own
/// devices.
#[derive(Clone)]
pub struct EdgeNodeEntity {
    inner: Arc<EntityInner>,
}

/// A generic application listening to a whole domain.
#[derive(Clone)]
pub struct ApplicationEntity {
    inner: Arc<EntityInner>,
}

/// The SCADA application: domain-wide listener with STATE announcements and
/// command sending.
#[derive(Clone)]
pub struct ScadaEntity {
    inner: Arc<EntityInner>,
}

macro_rules! impl_entity_role {
    ($($entity:ty),* $(,)?) => {
        $(
            impl $entity {
                pub(crate) fn from_inner(inner: Arc<EntityInner>) -> Self {
                    Self { inner }
                }

                /// Run `f` with exclusive access to this entity's state.
                ///
                /// The same lock serializes inbound command dispatch, so keep
                /// the closure short and free of blocking calls.
                pub fn with_state<R>(&self, f: impl FnOnce(&mut EntityState) -> R) -> R {
                    let mut state = self.inner.state.lock().unwrap();
                    f(&mut state)
                }

                /// Set a descriptive attribute metric.
                pub fn set_attribute<V: Into<MetricValue>>(
                    &self,
                    name: &str,
                    value: V,
                ) -> Result<(), MetricError> {
                    self.with_state(|state| state.attributes.set_value(name, value))
                }

                /// Set a telemetry metric.
                pub fn set_data<V: Into<MetricValue>>(
                    &self,
                    name: &str,
                    value: V,
                ) -> Result<(), MetricError> {
                    self.with_state(|state| state.data.set_value(name, value))
                }

                /// Register or update a writable command metric.
                pub fn set_command<V: Into<MetricValue>>(
                    &self,
                    name: &str,
                    value: V,
                ) -> Result<(), MetricError> {
                    self.with_state(|state| state.commands.set_value(name, value))
                }

                /// Register the change hook of a command metric.
                pub fn set_command_on_change<F>(
                    &self,
                    name: &str,
                    on_change: F,
                ) -> Result<(), MetricError>
                where
                    F: FnMut(&MetricValue) + Send + 'static,
                {
                    self.with_state(|state| state.commands.set_on_change(name, on_change))
                }

                /// Called after the transport (re)connects and this entity's
                /// subscriptions are renewed.
                pub fn on_connect<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
                    self.inner.callbacks.lock().unwrap().on_connect = Some(Arc::new(callback));
                }

                pub fn on_disconnect<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
                    self.inner.callbacks.lock().unwrap().on_disconnect = Some(Arc::new(callback));
                }

                /// Called for every message delivered to this entity's
                /// subscriptions.
                pub fn on_message<F>(&self, callback: F)
                where
                    F: Fn(&TopicAddress, InboundMessage<'_>) + Send + Sync + 'static,
                {
                    self.inner.callbacks.lock().unwrap().on_message = Some(Arc::new(callback));
                }

                /// Called once per inbound command message with the batch of
                /// applied command metrics.
                pub fn on_command<F>(&self, callback: F)
                where
                    F: Fn(&[PayloadMetric]) + Send + Sync + 'static,
                {
                    self.inner.callbacks.lock().unwrap().on_command = Some(Arc::new(callback));
                }
            }

            impl EntityPublisher for $entity {
                fn entity_id(&self) -> &EntityId {
                    &self.inner.id
                }

                fn is_connected(&self) -> bool {
                    self.inner.transport.is_connected()
                }

                async fn publish_birth(&self) -> Result<(), PublishError> {
                    self.inner.publish_birth().await
                }

                async fn publish_data(&self, send_all: bool) -> Result<(), PublishError> {
                    self.inner.publish_data(send_all).await
                }

                async fn publish_death(&self) -> Result<(), PublishError> {
                    self.inner.publish_death().await
                }

                async fn disconnect(&self, skip_death: bool) {
                    self.inner.disconnect(skip_death).await
                }
            }
        )*
    };
}

impl_entity_role!(DeviceEntity, EdgeNodeEntity, ApplicationEntity, ScadaEntity);

impl EdgeNodeEntity {
    /// Send a DCMD to one of this node's devices.
    ///
    /// The metric list is built from `commands` alone, never from entity
    /// state; an empty mapping is rejected.
    pub async fn publish_command_device(
        &self,
        device_id: &str,
        commands: Vec<(String, MetricValue)>,
    ) -> Result<(), PublishError> {
        if !self.inner.transport.is_connected() {
            warn!("{} - command not published, transport disconnected", self.inner.id);
            return Err(PublishError::NotConnected);
        }
        let message = match lifecycle::device_command_message(
            &self.inner.id.domain,
            &self.inner.id.node_id,
            device_id,
            commands,
        ) {
            Ok(message) => message,
            Err(e) => {
                warn!("{} - command not published: {e}", self.inner.id);
                return Err(e);
            }
        };
        self.inner.publish(message).await?;
        info!("{} - published command to device {device_id}", self.inner.id);
        Ok(())
    }
}

impl ScadaEntity {
    /// Publish this application's STATE announcement as a raw retained
    /// string body.
    pub async fn publish_state(&self, online: bool) -> Result<(), PublishError> {
        if !self.inner.transport.is_connected() {
            warn!("{} - state not published, transport disconnected", self.inner.id);
            return Err(PublishError::NotConnected);
        }
        let (topic, body) = lifecycle::state_message(&self.inner.id, online);
        let (qos, retain) = topic.publish_quality_retain();
        let topic = topic.to_string();
        *self.inner.loopback_topic.lock().unwrap() = Some(topic.clone());
        match self
            .inner
            .transport
            .publish(topic, Bytes::from_static(body.as_bytes()), qos, retain)
            .await
        {
            Ok(()) => {
                info!("{} - published STATE {body}", self.inner.id);
                Ok(())
            }
            Err(()) => Err(PublishError::NotConnected),
        }
    }

    /// Send an NCMD to a node in this application's domain.
    pub async fn send_node_command(
        &self,
        node_id: &str,
        commands: Vec<(String, MetricValue)>,
    ) -> Result<(), PublishError> {
        let message = lifecycle::node_command_message(&self.inner.id.domain, node_id, commands);
        self.send_command(message).await
    }

    /// Send a DCMD to a device in this application's domain.
    pub async fn send_device_command(
        &self,
        node_id: &str,
        device_id: &str,
        commands: Vec<(String, MetricValue)>,
    ) -> Result<(), PublishError> {
        let message = lifecycle::device_command_message(
            &self.inner.id.domain,
            node_id,
            device_id,
            commands,
        );
        self.send_command(message).await
    }

    async fn send_command(
        &self,
        message: Result<OutboundMessage, PublishError>,
    ) -> Result<(), PublishError> {
        if !self.inner.transport.is_connected() {
            warn!("{} - command not published, transport disconnected", self.inner.id);
            return Err(PublishError::NotConnected);
        }
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!("{} - command not published: {e}", self.inner.id);
                return Err(e);
            }
        };
        let topic = message.topic.to_string();
        self.inner.publish(message).await?;
        info!("{} - published command to {topic}", self.inner.id);
        Ok(())
    }
}
