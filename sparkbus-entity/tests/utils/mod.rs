use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sparkbus_codec_json::JsonCodec;
use sparkbus_entity::MessageRouter;
use sparkbus_transport::channel::{ChannelBroker, ChannelEventLoop, TransportRequest};
use sparkbus_types::payload::{Payload, PayloadCodec, PayloadMetric};
use sparkbus_types::topic::{QoS, TopicFilter};
use tokio::time::timeout;

/// Build a router over the channel transport and spawn its dispatch loop.
pub fn setup_router() -> (Arc<MessageRouter>, ChannelBroker) {
    let (event_loop, transport, broker) = ChannelEventLoop::new();
    let router = Arc::new(MessageRouter::new(
        Arc::new(transport),
        Arc::new(JsonCodec::new()),
    ));
    let run_router = router.clone();
    tokio::spawn(async move { run_router.run(Box::new(event_loop)).await });
    (router, broker)
}

pub async fn recv_request(broker: &mut ChannelBroker) -> TransportRequest {
    timeout(Duration::from_secs(1), broker.rx_requests.recv())
        .await
        .expect("timed out waiting for a transport request")
        .expect("transport request channel closed")
}

pub async fn expect_publish(broker: &mut ChannelBroker) -> (String, Bytes, QoS, bool) {
    match recv_request(broker).await {
        TransportRequest::Publish {
            topic,
            payload,
            qos,
            retain,
        } => (topic, payload, qos, retain),
        request => panic!("expected a publish, got {request:?}"),
    }
}

pub async fn expect_subscribe(broker: &mut ChannelBroker) -> Vec<TopicFilter> {
    match recv_request(broker).await {
        TransportRequest::Subscribe(filters) => filters,
        request => panic!("expected a subscribe, got {request:?}"),
    }
}

pub async fn expect_no_request(broker: &mut ChannelBroker) {
    if let Ok(request) = timeout(Duration::from_millis(100), broker.rx_requests.recv()).await {
        panic!("expected no transport request, got {request:?}");
    }
}

pub fn decode(payload: &Bytes) -> Payload {
    JsonCodec::new().decode(payload).expect("payload decodes")
}

pub fn encode(payload: &Payload) -> Bytes {
    JsonCodec::new().encode(payload)
}

pub fn command_payload(metrics: Vec<PayloadMetric>) -> Bytes {
    encode(&Payload {
        timestamp: Some(1),
        metrics,
    })
}
