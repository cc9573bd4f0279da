//! Property tests for the reconciliation pass.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use peermesh::{reconcile, Callbacks, ConnectOutcome, DisconnectOutcome, NodeName};
use proptest::prelude::*;

fn local_node() -> NodeName {
    NodeName::new("me", "127.0.0.1")
}

/// Callbacks whose connect/disconnect always succeed, recording every peer
/// they were invoked for.
fn always_true_callbacks(
    connected: Vec<NodeName>,
) -> (Callbacks, Arc<Mutex<Vec<NodeName>>>, Arc<Mutex<Vec<NodeName>>>) {
    let connects = Arc::new(Mutex::new(Vec::new()));
    let disconnects = Arc::new(Mutex::new(Vec::new()));

    let connects_in = connects.clone();
    let disconnects_in = disconnects.clone();
    let callbacks = Callbacks::new(
        move |peer: NodeName| {
            let connects = connects_in.clone();
            async move {
                connects.lock().unwrap().push(peer);
                ConnectOutcome::Connected
            }
        },
        move |peer: NodeName| {
            let disconnects = disconnects_in.clone();
            async move {
                disconnects.lock().unwrap().push(peer);
                DisconnectOutcome::Disconnected
            }
        },
        move || {
            let connected = connected.clone();
            async move { connected }
        },
    );

    (callbacks, connects, disconnects)
}

/// A small universe of peers keeps set overlaps frequent.
fn arb_peer() -> impl Strategy<Value = NodeName> {
    (0u8..6).prop_map(|n| NodeName::new("node", &format!("10.0.0.{n}")))
}

fn arb_peer_set() -> impl Strategy<Value = HashSet<NodeName>> {
    prop::collection::hash_set(arb_peer(), 0..6)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

proptest! {
    /// With always-true callbacks the carry-forward set is exactly
    /// `(previous ∪ (desired \ current \ {self})) \ (previous \ desired)`.
    #[test]
    fn carry_forward_matches_set_formula(
        previous in arb_peer_set(),
        desired in arb_peer_set(),
        current in arb_peer_set(),
    ) {
        let local = local_node();
        let (callbacks, _, _) = always_true_callbacks(current.iter().cloned().collect());

        let next = block_on(reconcile("prop", &local, &callbacks, &desired, &previous, true));

        let mut expected: HashSet<NodeName> = previous.clone();
        for peer in &desired {
            if !current.contains(peer) && *peer != local {
                expected.insert(peer.clone());
            }
        }
        for peer in previous.difference(&desired) {
            expected.remove(peer);
        }

        prop_assert_eq!(next, expected);
    }

    /// Applying the reconcile a second time over its own output changes
    /// nothing.
    #[test]
    fn reconcile_is_idempotent(
        previous in arb_peer_set(),
        desired in arb_peer_set(),
        current in arb_peer_set(),
    ) {
        let local = local_node();
        let (callbacks, _, _) = always_true_callbacks(current.iter().cloned().collect());

        let once = block_on(reconcile("prop", &local, &callbacks, &desired, &previous, true));
        let twice = block_on(reconcile("prop", &local, &callbacks, &desired, &once, true));

        prop_assert_eq!(once, twice);
    }

    /// No callback is ever invoked for the local node, even when the input
    /// sets contain it.
    #[test]
    fn local_node_is_never_instructed(
        mut previous in arb_peer_set(),
        mut desired in arb_peer_set(),
        include_in_previous in any::<bool>(),
        include_in_desired in any::<bool>(),
    ) {
        let local = local_node();
        if include_in_previous {
            previous.insert(local.clone());
        }
        if include_in_desired {
            desired.insert(local.clone());
        }
        let (callbacks, connects, disconnects) = always_true_callbacks(Vec::new());

        block_on(reconcile("prop", &local, &callbacks, &desired, &previous, true));

        prop_assert!(!connects.lock().unwrap().contains(&local));
        prop_assert!(!disconnects.lock().unwrap().contains(&local));
    }

    /// A peer whose connect returned "unreachable" is absent from the
    /// carry-forward set.
    #[test]
    fn unreachable_peers_are_not_carried_forward(
        previous in arb_peer_set(),
        desired in arb_peer_set(),
        unreachable in arb_peer_set(),
    ) {
        let local = local_node();
        let unreachable_in = unreachable.clone();
        let callbacks = Callbacks::new(
            move |peer: NodeName| {
                let unreachable = unreachable_in.clone();
                async move {
                    if unreachable.contains(&peer) {
                        ConnectOutcome::Unreachable
                    } else {
                        ConnectOutcome::Connected
                    }
                }
            },
            |_| async { DisconnectOutcome::Disconnected },
            || async { Vec::new() },
        );

        let next = block_on(reconcile("prop", &local, &callbacks, &desired, &previous, true));

        for peer in desired.intersection(&unreachable) {
            prop_assert!(!next.contains(peer));
        }
    }
}
