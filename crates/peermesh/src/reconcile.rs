//! The shared reconciliation pass.
//!
//! Every polling strategy reduces to "produce the desired peer set, hand it
//! here". Given the desired set and the carry-forward set from the previous
//! cycle, the reconciler diffs against the transport's currently connected
//! set and invokes the callbacks to converge, returning the next
//! carry-forward set. Within one pass all disconnects happen before any
//! connect.

use std::collections::HashSet;

use metrics::counter;
use tracing::{info, warn};

use crate::callbacks::{Callbacks, ConnectOutcome, DisconnectOutcome};
use crate::node::NodeName;

/// Runs one reconcile cycle and returns the new carry-forward set.
///
/// Peers in `previous` but not in `desired` are disconnected (skipped when
/// `prune` is false); peers in `desired` that are neither connected nor the
/// local node are connected. A peer whose connect returned
/// [`ConnectOutcome::Unreachable`] or [`ConnectOutcome::Ignored`] is left out
/// of the returned set so the next cycle re-attempts it from scratch; a peer
/// whose disconnect failed stays in the returned set and is retried.
pub async fn reconcile(
    topology: &str,
    local_node: &NodeName,
    callbacks: &Callbacks,
    desired: &HashSet<NodeName>,
    previous: &HashSet<NodeName>,
    prune: bool,
) -> HashSet<NodeName> {
    let current: HashSet<NodeName> = callbacks.list_connected().await.into_iter().collect();
    let mut next = previous.clone();

    if prune {
        for peer in previous.difference(desired) {
            if peer == local_node {
                next.remove(peer);
                continue;
            }
            match callbacks.disconnect(peer).await {
                DisconnectOutcome::Disconnected => {
                    info!(topology, peer = %peer, "Disconnected from peer");
                    counter!("peermesh_disconnects_total", "topology" => topology.to_string())
                        .increment(1);
                    next.remove(peer);
                }
                DisconnectOutcome::NotConnected => {
                    info!(topology, peer = %peer, "Peer was already disconnected");
                    next.remove(peer);
                }
                DisconnectOutcome::Ignored => {
                    info!(topology, peer = %peer, "Peer is not part of the transport network");
                    next.remove(peer);
                }
                DisconnectOutcome::Failed(reason) => {
                    warn!(topology, peer = %peer, reason = %reason,
                        "Disconnect failed, will retry");
                }
            }
        }
    }

    for peer in desired {
        if peer == local_node || current.contains(peer) {
            continue;
        }
        match callbacks.connect(peer).await {
            ConnectOutcome::Connected => {
                info!(topology, peer = %peer, "Connected to peer");
                counter!("peermesh_connects_total", "topology" => topology.to_string())
                    .increment(1);
                next.insert(peer.clone());
            }
            ConnectOutcome::Unreachable => {
                warn!(topology, peer = %peer, "Peer unreachable, will retry on next cycle");
                next.remove(peer);
            }
            ConnectOutcome::Ignored => {
                warn!(topology, peer = %peer, "Transport refused peer");
                next.remove(peer);
            }
        }
    }

    next
}
