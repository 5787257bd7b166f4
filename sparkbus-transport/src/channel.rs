use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;
use sparkbus_types::topic::{QoS, TopicFilter};
use tokio::sync::mpsc;

use crate::{ConnectError, ConnectOptions, LastWill, TransportEvent};

/// Requests a [ChannelTransport] forwards to its [ChannelBroker].
#[derive(Clone, Debug, PartialEq)]
pub enum TransportRequest {
    Connect(ConnectOptions),
    Disconnect,
    Publish {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    },
    Subscribe(Vec<TopicFilter>),
}

/// A [Transport](crate::Transport) implementation that uses channels for
/// message passing.
///
/// Useful for writing tests where it is not appropriate to be running a real
/// broker setup.
///
/// # Examples
///
/// See [ChannelBroker]
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<TransportRequest>,
    connected: Arc<AtomicBool>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

#[async_trait]
impl crate::Transport for ChannelTransport {
    async fn connect(&self, options: ConnectOptions) -> Result<(), ConnectError> {
        match self.tx.send(TransportRequest::Connect(options)) {
            Ok(_) => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(_) => Err(ConnectError::Refused("broker channel closed".into())),
        }
    }

    async fn disconnect(&self) -> Result<(), ()> {
        self.connected.store(false, Ordering::SeqCst);
        match self.tx.send(TransportRequest::Disconnect) {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn publish(
        &self,
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), ()> {
        match self.tx.send(TransportRequest::Publish {
            topic,
            payload,
            qos,
            retain,
        }) {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }

    async fn subscribe_many(&self, filters: Vec<TopicFilter>) -> Result<(), ()> {
        match self.tx.send(TransportRequest::Subscribe(filters)) {
            Ok(_) => Ok(()),
            Err(_) => Err(()),
        }
    }

    fn set_last_will(&self, will: LastWill) {
        let mut last_will = self.last_will.lock().unwrap();
        *last_will = Some(will);
    }
}

/// A "broker" that manages the communication between a [ChannelTransport] and
/// a [ChannelEventLoop].
///
/// Used to feed events to the event loop and inspect requests produced by the
/// transport handle.
///
/// # Examples
///
/// ```no_run
/// use sparkbus_transport::channel::ChannelEventLoop;
/// use tokio::runtime::Runtime;
///
/// let rt = Runtime::new().unwrap();
/// rt.block_on(async {
///     let (mut eventloop, transport, mut broker) = ChannelEventLoop::new();
///
///     //create a router that uses the event loop and transport
///
///     //bring the connection up
///     broker.go_online();
///
///     //receive a request from the transport handle
///     let request = broker.rx_requests.recv().await.unwrap();
/// });
/// ```
pub struct ChannelBroker {
    pub rx_requests: mpsc::UnboundedReceiver<TransportRequest>,
    pub tx_event: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelBroker {
    /// Retrieves the current last will set on the transport, if any.
    pub fn last_will(&self) -> Option<LastWill> {
        self.last_will.lock().unwrap().clone()
    }

    /// Mark the transport connected and emit a `Connected` event.
    pub fn go_online(&self) {
        self.connected.store(true, Ordering::SeqCst);
        _ = self.tx_event.send(TransportEvent::Connected);
    }

    /// Mark the transport disconnected and emit a `Disconnected` event.
    pub fn go_offline(&self) {
        self.connected.store(false, Ordering::SeqCst);
        _ = self.tx_event.send(TransportEvent::Disconnected);
    }

    /// Deliver an inbound message to the event loop.
    pub fn inject_message<S: Into<String>>(&self, topic: S, payload: Bytes) {
        _ = self.tx_event.send(TransportEvent::Message {
            topic: topic.into(),
            payload,
        });
    }
}

/// An [EventLoop](crate::EventLoop) implementation that uses channels.
///
/// # Examples
///
/// See [ChannelBroker]
pub struct ChannelEventLoop {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl ChannelEventLoop {
    /// Creates a new event loop along with the corresponding transport handle
    /// and broker.
    pub fn new() -> (Self, ChannelTransport, ChannelBroker) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        let (tx_requests, rx_requests) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let last_will = Arc::new(Mutex::new(None));
        let event_loop = Self { rx: rx_event };
        (
            event_loop,
            ChannelTransport {
                tx: tx_requests,
                connected: connected.clone(),
                last_will: last_will.clone(),
            },
            ChannelBroker {
                rx_requests,
                tx_event,
                connected,
                last_will,
            },
        )
    }
}

#[async_trait]
impl crate::EventLoop for ChannelEventLoop {
    async fn poll(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
