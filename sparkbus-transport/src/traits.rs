use async_trait::async_trait;
use bytes::Bytes;
use sparkbus_types::topic::{QoS, TopicFilter};

use crate::{ConnectError, ConnectOptions, LastWill, TransportEvent};

/// Boundary trait for the shared broker connection.
///
/// One transport handle is shared by every local entity; implementations must
/// accept concurrent `publish` calls.
#[async_trait]
pub trait Transport {
    /// Open the connection, blocking the calling task until the broker
    /// accepts or `options.timeout` elapses.
    async fn connect(&self, options: ConnectOptions) -> Result<(), ConnectError>;

    /// Close the connection.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the disconnection was successful
    /// - `Err(())` if the disconnection failed
    async fn disconnect(&self) -> Result<(), ()>;

    fn is_connected(&self) -> bool;

    /// Publish raw bytes to a topic.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the message was accepted by the client for delivery
    /// - `Err(())` if the publication failed
    async fn publish(
        &self,
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ()>;

    /// Subscribes to a single topic.
    ///
    /// This is a convenience method that calls `subscribe_many` with a single
    /// filter.
    async fn subscribe(&self, filter: TopicFilter) -> Result<(), ()> {
        self.subscribe_many(vec![filter]).await
    }

    /// Subscribes to multiple topics in a single operation.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if all subscriptions were successful
    /// - `Err(())` if any subscription failed
    async fn subscribe_many(&self, filters: Vec<TopicFilter>) -> Result<(), ()>;

    /// Register the message the broker should publish if this connection
    /// drops ungracefully.
    fn set_last_will(&self, will: LastWill);
}

pub type DynTransport = dyn Transport + Send + Sync;

#[async_trait]
pub trait EventLoop {
    /// Produce the next transport event, or `None` once the transport has
    /// shut down for good.
    async fn poll(&mut self) -> Option<TransportEvent>;
}

pub type DynEventLoop = dyn EventLoop + Send;
