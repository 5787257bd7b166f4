//! Part of [sparkbus](https://github.com/sparkbus/sparkbus), an entity state
//! and message routing layer for Sparkplug-style publish/subscribe telemetry.
//!
//! This crate implements the entity layer itself: metric stores with change
//! tracking, per-entity lifecycle state, the BIRTH/DATA/DEATH/STATE
//! publishing rules, command validation, and the [MessageRouter] that
//! demultiplexes one shared transport connection onto every registered
//! entity.

mod entity;
mod error;
mod lifecycle;
mod router;
mod state;
mod store;

pub use entity::{
    ApplicationEntity, CommandCallback, ConnectCallback, DeviceEntity, DisconnectCallback,
    EdgeNodeEntity, EntityKind, EntityOptions, EntityPublisher, InboundMessage, MessageCallback,
    ScadaEntity,
};
pub use error::{PublishError, RegistrationError};
pub use lifecycle::Operation;
pub use router::MessageRouter;
pub use state::{EntityId, EntityState};
pub use store::{Metric, MetricError, MetricStore, OnChange};
