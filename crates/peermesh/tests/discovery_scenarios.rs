//! End-to-end discovery scenarios across strategies and the supervisor.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use peermesh::strategy::{
    DnsPoll, DnsPollConfig, DnsSrvPoll, DnsSrvPollConfig, StaticHosts, StaticHostsConfig,
};
use peermesh::resolve::Resolve;
use peermesh::{
    Callbacks, ConnectOutcome, DisconnectOutcome, DiscoveryResult, NodeName, Strategy,
    SupervisorOptions, TopologyContext, TopologySpec, TopologySupervisor,
};

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

/// Waits until `condition` holds, or panics after five seconds.
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

/// Resolver that answers each lookup with the next scripted address list,
/// repeating the last one once the script runs out.
struct ScriptedResolver {
    answers: Vec<Vec<IpAddr>>,
    calls: Mutex<usize>,
}

impl ScriptedResolver {
    fn new(answers: Vec<Vec<IpAddr>>) -> Self {
        Self {
            answers,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl Resolve for ScriptedResolver {
    async fn lookup_ip(&self, _name: &str) -> DiscoveryResult<Vec<IpAddr>> {
        let mut calls = self.calls.lock().unwrap();
        let answer = self.answers[(*calls).min(self.answers.len() - 1)].clone();
        *calls += 1;
        Ok(answer)
    }

    async fn lookup_srv(&self, _name: &str) -> DiscoveryResult<Vec<String>> {
        Ok(Vec::new())
    }
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

// Scenario: a static topology under the supervisor connects to every
// configured host exactly once.
#[tokio::test]
async fn static_topology_connects_configured_hosts() {
    let recording = Arc::new(Recording::default());
    let specs = vec![TopologySpec::new(
        "static",
        StaticHosts::new(
            StaticHostsConfig::new()
                .with_host("a@1.1.1.1".parse().unwrap())
                .with_host("b@2.2.2.2".parse().unwrap()),
        ),
    )];
    let options = SupervisorOptions::new(NodeName::new("me", "127.0.0.1"))
        .with_default_callbacks(recording_callbacks(&recording));

    let supervisor = TopologySupervisor::start(specs, options).unwrap();
    wait_until(|| recording.connects().len() == 2).await;
    supervisor.stop().await;

    let mut connects = recording.connects();
    connects.sort();
    assert_eq!(
        connects,
        vec![
            "a@1.1.1.1".parse::<NodeName>().unwrap(),
            "b@2.2.2.2".parse::<NodeName>().unwrap()
        ]
    );
    assert!(recording.disconnects().is_empty());
}

// Scenario: an address that disappears from the DNS answer is disconnected
// on the next poll.
#[tokio::test]
async fn dns_poll_disconnects_vanished_addresses() {
    let recording = Arc::new(Recording::default());
    let resolver = Arc::new(ScriptedResolver::new(vec![
        vec![ip("10.0.0.1"), ip("10.0.0.2")],
        vec![ip("10.0.0.1")],
    ]));

    let strategy = DnsPoll::new(
        DnsPollConfig::new("cluster.example.com", "node")
            .with_polling_interval(Duration::from_millis(20)),
    )
    .with_resolver(resolver);

    let (mut ctx, stop) = TopologyContext::new(
        "dns",
        NodeName::new("me", "127.0.0.1"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move { strategy.run(&mut ctx).await });

    wait_until(|| !recording.disconnects().is_empty()).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap().unwrap();

    let mut connects: HashSet<NodeName> = recording.connects().into_iter().collect();
    assert!(connects.remove(&"node@10.0.0.1".parse().unwrap()));
    assert!(connects.remove(&"node@10.0.0.2".parse().unwrap()));
    assert_eq!(
        recording.disconnects(),
        vec!["node@10.0.0.2".parse::<NodeName>().unwrap()]
    );
}

// Scenario: with pruning disabled the vanished address stays connected.
#[tokio::test]
async fn dns_poll_without_prune_keeps_vanished_addresses() {
    let recording = Arc::new(Recording::default());
    let calls = Arc::new(ScriptedResolver::new(vec![
        vec![ip("10.0.0.1"), ip("10.0.0.2")],
        vec![ip("10.0.0.1")],
    ]));

    let strategy = DnsPoll::new(
        DnsPollConfig::new("cluster.example.com", "node")
            .with_polling_interval(Duration::from_millis(20))
            .with_prune(false),
    )
    .with_resolver(calls.clone());

    let (mut ctx, stop) = TopologyContext::new(
        "dns",
        NodeName::new("me", "127.0.0.1"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move { strategy.run(&mut ctx).await });

    // Let several polls past the shrunken answer happen.
    wait_until(|| *calls.calls.lock().unwrap() >= 4).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap().unwrap();

    assert!(recording.disconnects().is_empty());
}

// Scenario: the DNS answer containing the local node's own address never
// produces a self-connect.
#[tokio::test]
async fn dns_poll_filters_local_node() {
    let recording = Arc::new(Recording::default());
    let resolver = Arc::new(ScriptedResolver::new(vec![vec![
        ip("10.0.0.1"),
        ip("10.0.0.7"),
    ]]));

    let strategy = DnsPoll::new(
        DnsPollConfig::new("cluster.example.com", "node")
            .with_polling_interval(Duration::from_millis(20)),
    )
    .with_resolver(resolver);

    // The local node is one of the resolved addresses.
    let (mut ctx, stop) = TopologyContext::new(
        "dns",
        NodeName::new("node", "10.0.0.7"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move { strategy.run(&mut ctx).await });

    wait_until(|| !recording.connects().is_empty()).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap().unwrap();

    assert!(recording
        .connects()
        .iter()
        .all(|peer| peer != &NodeName::new("node", "10.0.0.7")));
}

/// Resolver answering SRV queries with fixed targets.
struct SrvResolver {
    targets: Vec<String>,
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl Resolve for SrvResolver {
    async fn lookup_ip(&self, _name: &str) -> DiscoveryResult<Vec<IpAddr>> {
        Ok(Vec::new())
    }

    async fn lookup_srv(&self, name: &str) -> DiscoveryResult<Vec<String>> {
        self.queries.lock().unwrap().push(name.to_string());
        Ok(self.targets.clone())
    }
}

// Scenario: SRV targets become peers named application@target.
#[tokio::test]
async fn dns_srv_poll_connects_service_targets() {
    let recording = Arc::new(Recording::default());
    let resolver = Arc::new(SrvResolver {
        targets: vec![
            "web-0.web.prod.svc.cluster.local".to_string(),
            "web-1.web.prod.svc.cluster.local".to_string(),
        ],
        queries: Mutex::new(Vec::new()),
    });

    let strategy = DnsSrvPoll::new(
        DnsSrvPollConfig::new("web", "prod", "app")
            .with_polling_interval(Duration::from_millis(20)),
    )
    .with_resolver(resolver.clone());

    let (mut ctx, stop) = TopologyContext::new(
        "dns-srv",
        NodeName::new("app", "web-0.web.prod.svc.cluster.local"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move { strategy.run(&mut ctx).await });

    wait_until(|| !recording.connects().is_empty()).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap().unwrap();

    // Own SRV target filtered; the composed query names the headless service.
    assert_eq!(
        recording.connects()[0],
        "app@web-1.web.prod.svc.cluster.local".parse::<NodeName>().unwrap()
    );
    let queries = resolver.queries.lock().unwrap().clone();
    assert!(queries[0].starts_with("web.prod.svc."));
}

// A strategy with missing required options must idle, not crash and not
// disconnect anything.
#[tokio::test]
async fn dns_poll_with_missing_config_does_nothing() {
    let recording = Arc::new(Recording::default());
    let strategy = DnsPoll::new(
        DnsPollConfig::default().with_polling_interval(Duration::from_millis(10)),
    );

    let (mut ctx, stop) = TopologyContext::new(
        "dns",
        NodeName::new("me", "127.0.0.1"),
        recording_callbacks(&recording),
    );
    let worker = tokio::spawn(async move { strategy.run(&mut ctx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.send(()).await.unwrap();
    worker.await.unwrap().unwrap();

    assert!(recording.connects().is_empty());
    assert!(recording.disconnects().is_empty());
}
