//! Integration tests for the Rancher and Nomad metadata pollers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use peermesh::strategy::{Nomad, NomadConfig, Rancher, RancherConfig};
use peermesh::{
    Callbacks, ConnectOutcome, DisconnectOutcome, NodeName, Strategy, TopologyContext,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct Recording {
    connects: Mutex<Vec<NodeName>>,
    disconnects: Mutex<Vec<NodeName>>,
}

impl Recording {
    fn connects(&self) -> Vec<NodeName> {
        self.connects.lock().unwrap().clone()
    }

    fn disconnects(&self) -> Vec<NodeName> {
        self.disconnects.lock().unwrap().clone()
    }
}

fn recording_callbacks(recording: &Arc<Recording>) -> Callbacks {
    let connects = recording.clone();
    let disconnects = recording.clone();
    Callbacks::new(
        move |peer: NodeName| {
            let recording = connects.clone();
            async move {
                recording.connects.lock().unwrap().push(peer);
                ConnectOutcome::Connected
            }
        },
        move |peer: NodeName| {
            let recording = disconnects.clone();
            async move {
                recording.disconnects.lock().unwrap().push(peer);
                DisconnectOutcome::Disconnected
            }
        },
        || async { Vec::new() },
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn rancher_connects_container_ips() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/latest/self/service"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "containers": [
                {"name": "app_1", "primary_ip": "10.42.0.1"},
                {"name": "app_2", "primary_ip": "10.42.0.2"},
                {"name": "sidecar"}
            ]
        })))
        .mount(&server)
        .await;

    let recording = Arc::new(Recording::default());
    let strategy = Rancher::new(
        RancherConfig::new("app")
            .with_metadata_base_url(server.uri())
            .with_polling_interval(Duration::from_millis(20)),
    );
    let (mut ctx, stop) = TopologyContext::new(
        "rancher",
        NodeName::new("app", "10.42.0.1"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move {
        strategy.run(&mut ctx).await.unwrap();
    });

    wait_until(|| !recording.connects().is_empty()).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap();

    // The local node's own container is dropped before diffing.
    assert_eq!(
        recording.connects()[0],
        "app@10.42.0.2".parse::<NodeName>().unwrap()
    );
}

#[tokio::test]
async fn nomad_connects_service_addresses_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/service/app"))
        .and(query_param("namespace", "prod"))
        .and(header("X-Nomad-Token", "nomad-acl-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"Address": "10.0.1.1", "Port": 4648, "ServiceName": "app"},
            {"Address": "10.0.1.2", "Port": 4648, "ServiceName": "app"}
        ])))
        .mount(&server)
        .await;

    let recording = Arc::new(Recording::default());
    let strategy = Nomad::new(
        NomadConfig::new(server.uri(), "app", "app")
            .with_namespace("prod")
            .with_token("nomad-acl-token")
            .with_polling_interval(Duration::from_millis(20)),
    );
    let (mut ctx, stop) = TopologyContext::new(
        "nomad",
        NodeName::new("me", "127.0.0.1"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move {
        strategy.run(&mut ctx).await.unwrap();
    });

    wait_until(|| recording.connects().len() >= 2).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap();

    let connects: std::collections::HashSet<NodeName> =
        recording.connects().into_iter().collect();
    assert!(connects.contains(&"app@10.0.1.1".parse().unwrap()));
    assert!(connects.contains(&"app@10.0.1.2".parse().unwrap()));
}

#[tokio::test]
async fn nomad_server_error_preserves_membership() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/service/app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"Address": "10.0.1.1"}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/service/app"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let recording = Arc::new(Recording::default());
    let strategy = Nomad::new(
        NomadConfig::new(server.uri(), "app", "app")
            .with_polling_interval(Duration::from_millis(20)),
    );
    let (mut ctx, stop) = TopologyContext::new(
        "nomad",
        NodeName::new("me", "127.0.0.1"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move {
        strategy.run(&mut ctx).await.unwrap();
    });

    wait_until(|| !recording.connects().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap();

    assert!(recording.disconnects().is_empty());
}
