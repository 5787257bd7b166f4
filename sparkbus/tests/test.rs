use std::sync::Arc;
use std::time::Duration;

use sparkbus::codec::json::JsonCodec;
use sparkbus::entity::{EntityOptions, EntityPublisher, MessageRouter};
use sparkbus::transport::channel::{ChannelEventLoop, TransportRequest};
use tokio::time::timeout;

#[tokio::test]
async fn device_birth_through_the_facade() {
    let (event_loop, transport, mut broker) = ChannelEventLoop::new();
    let router = Arc::new(MessageRouter::new(
        Arc::new(transport),
        Arc::new(JsonCodec::new()),
    ));
    let run_router = router.clone();
    tokio::spawn(async move { run_router.run(Box::new(event_loop)).await });

    let device = router
        .register_device("plant", "gateway", "sensor", EntityOptions::default())
        .unwrap();
    device.set_data("temperature", 20.0).unwrap();

    broker.go_online();
    let subscription = timeout(Duration::from_secs(1), broker.rx_requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(subscription, TransportRequest::Subscribe(_)));

    device.publish_birth().await.unwrap();
    let publish = timeout(Duration::from_secs(1), broker.rx_requests.recv())
        .await
        .unwrap()
        .unwrap();
    match publish {
        TransportRequest::Publish { topic, .. } => {
            assert_eq!(topic, "spBv1.0/plant/DBIRTH/gateway/sensor")
        }
        request => panic!("expected a publish, got {request:?}"),
    }
}
