//! Signal waiter against the Firebase REST shape, over a scripted transport.

use parkgate_core::{CycleId, PipelineError};
use parkgate_network::mock::{Reply, ScriptedTransport};
use parkgate_network::transport::{Method, RequestBody};
use parkgate_network::{FirebaseSignalStore, SignalConfig, SignalWaiter};
use serde_json::json;
use std::time::Duration;

const BASE: &str = "https://parkgate-demo.firebaseio.com";
const TRIGGER: &str = "https://parkgate-demo.firebaseio.com/parking/car_detected.json?auth=t0k";
const ACK: &str = "https://parkgate-demo.firebaseio.com/parking/ack.json?auth=t0k";

fn store(transport: &ScriptedTransport) -> FirebaseSignalStore<ScriptedTransport> {
    FirebaseSignalStore::new(transport.clone(), BASE).with_auth_token("t0k")
}

#[tokio::test(start_paused = true)]
async fn consumes_signal_and_writes_back() {
    let transport = ScriptedTransport::new();
    transport.push(TRIGGER, Reply::json(200, json!(null)));
    transport.push(TRIGGER, Reply::json(200, json!(true)));
    transport.push(ACK, Reply::json(200, json!({})));

    let config = SignalConfig::default()
        .poll_interval(Duration::from_millis(250))
        .ack_path(Some("parking/ack".to_string()))
        .reset_value(Some(json!(false)));
    let mut waiter = SignalWaiter::new(store(&transport), config);

    let event = waiter.wait_for_signal(CycleId::new(12), None).await.unwrap();
    assert_eq!(event.polls, 2);

    let requests = transport.requests();
    let methods: Vec<Method> = requests.iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![Method::Get, Method::Get, Method::Put, Method::Put]);

    let RequestBody::Json(ack) = &requests[2].body else {
        panic!("ack must be JSON");
    };
    assert_eq!(requests[2].url, ACK);
    assert_eq!(ack["cycle_id"], json!(12));

    assert_eq!(requests[3].url, TRIGGER);
    assert_eq!(requests[3].body, RequestBody::Json(json!(false)));
}

#[tokio::test(start_paused = true)]
async fn unreachable_store_times_out() {
    let transport = ScriptedTransport::new();
    transport.push(TRIGGER, Reply::Unreachable);

    let mut waiter = SignalWaiter::new(
        store(&transport),
        SignalConfig::default().poll_interval(Duration::from_millis(500)),
    );

    let result = waiter
        .wait_for_signal(CycleId::FIRST, Some(Duration::from_secs(2)))
        .await;

    assert!(matches!(result, Err(PipelineError::SignalTimeout { .. })));
    assert!(transport.calls_to(BASE) >= 4);
}
