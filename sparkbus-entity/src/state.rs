use std::fmt;

use sparkbus_types::payload::PayloadMetric;
use sparkbus_types::topic::TopicAddress;

use crate::lifecycle::{self, Operation};
use crate::store::MetricStore;

/// Identity of a logical participant: the tuple every one of its topics is
/// built from. Device scoped iff `device_id` is present.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub domain: String,
    pub node_id: String,
    pub device_id: Option<String>,
}

impl EntityId {
    pub fn node<S: Into<String>, S1: Into<String>>(domain: S, node_id: S1) -> Self {
        Self {
            domain: domain.into(),
            node_id: node_id.into(),
            device_id: None,
        }
    }

    pub fn device<S: Into<String>, S1: Into<String>, S2: Into<String>>(
        domain: S,
        node_id: S1,
        device_id: S2,
    ) -> Self {
        Self {
            domain: domain.into(),
            node_id: node_id.into(),
            device_id: Some(device_id.into()),
        }
    }

    pub fn is_device(&self) -> bool {
        self.device_id.is_some()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_id {
            Some(device_id) => write!(f, "{}/{}/{}", self.domain, self.node_id, device_id),
            None => write!(f, "{}/{}", self.domain, self.node_id),
        }
    }
}

/// In-memory state of one entity: the three metric stores plus birth
/// tracking.
///
/// Created empty at entity construction, populated by the owner before the
/// first BIRTH and dropped with the owning entity; nothing persists across a
/// process restart.
pub struct EntityState {
    id: EntityId,
    /// Slow-changing descriptive fields.
    pub attributes: MetricStore,
    /// Telemetry, published with change filtering.
    pub data: MetricStore,
    /// Writable control points, always fully re-sent in BIRTH.
    pub commands: MetricStore,
    birth_published: bool,
}

impl EntityState {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            attributes: MetricStore::new(),
            data: MetricStore::new(),
            commands: MetricStore::new(),
            birth_published: false,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// True only when no metric is registered in any of the three stores.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.data.is_empty() && self.commands.is_empty()
    }

    pub fn mark_birth_published(&mut self) {
        self.birth_published = true;
    }

    /// Forget the published birth; called on disconnect.
    pub fn clear_birth_published(&mut self) {
        self.birth_published = false;
    }

    /// Whether a BIRTH must go out before DATA is valid again.
    pub fn birth_required(&self) -> bool {
        !self.birth_published
    }

    /// The full snapshot a BIRTH carries: attributes, data, then commands,
    /// each in insertion order.
    pub fn birth_snapshot(&self) -> Vec<PayloadMetric> {
        let mut metrics = self.attributes.snapshot(false);
        metrics.extend(self.data.snapshot(false));
        metrics.extend(self.commands.snapshot(false));
        metrics
    }

    /// The telemetry snapshot a DATA message carries.
    pub fn data_snapshot(&self, send_all: bool) -> Vec<PayloadMetric> {
        self.data.snapshot(!send_all)
    }

    /// The topic this entity publishes `operation` on.
    pub fn topic(&self, operation: Operation) -> TopicAddress {
        lifecycle::topic_for(&self.id, operation)
    }
}
