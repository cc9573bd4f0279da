//! Membership callbacks supplied by the embedding transport.
//!
//! The core never talks to the node-to-node transport directly. Instead the
//! caller hands over three bound invocables — connect, disconnect, and
//! list-connected — and the reconciler drives them to converge the membership
//! set. Each callback is a value (a closure capturing whatever fixed context
//! the transport needs), so the caller alone decides how peers are reached.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::node::NodeName;

/// Result of a connect callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Connected, or was already connected.
    Connected,
    /// The peer was not reachable; a later pass re-attempts it from scratch.
    Unreachable,
    /// The transport refused to consider the peer part of its network.
    Ignored,
}

/// Result of a disconnect callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Disconnected.
    Disconnected,
    /// The peer was not connected in the first place.
    NotConnected,
    /// The peer is not part of the transport's network.
    Ignored,
    /// Transport-specific failure; the peer is kept and retried later.
    Failed(String),
}

type ConnectFn = Arc<dyn Fn(NodeName) -> BoxFuture<'static, ConnectOutcome> + Send + Sync>;
type DisconnectFn = Arc<dyn Fn(NodeName) -> BoxFuture<'static, DisconnectOutcome> + Send + Sync>;
type ListConnectedFn = Arc<dyn Fn() -> BoxFuture<'static, Vec<NodeName>> + Send + Sync>;

/// The connect/disconnect/list-connected triple driving an actual transport.
///
/// Cloning is cheap; all three callbacks are shared behind `Arc`.
#[derive(Clone)]
pub struct Callbacks {
    connect: ConnectFn,
    disconnect: DisconnectFn,
    list_connected: ListConnectedFn,
}

impl Callbacks {
    /// Builds a callback triple from three async closures.
    pub fn new<C, CF, D, DF, L, LF>(connect: C, disconnect: D, list_connected: L) -> Self
    where
        C: Fn(NodeName) -> CF + Send + Sync + 'static,
        CF: Future<Output = ConnectOutcome> + Send + 'static,
        D: Fn(NodeName) -> DF + Send + Sync + 'static,
        DF: Future<Output = DisconnectOutcome> + Send + 'static,
        L: Fn() -> LF + Send + Sync + 'static,
        LF: Future<Output = Vec<NodeName>> + Send + 'static,
    {
        Self {
            connect: Arc::new(move |peer| {
                Box::pin(connect(peer)) as BoxFuture<'static, ConnectOutcome>
            }),
            disconnect: Arc::new(move |peer| {
                Box::pin(disconnect(peer)) as BoxFuture<'static, DisconnectOutcome>
            }),
            list_connected: Arc::new(move || {
                Box::pin(list_connected()) as BoxFuture<'static, Vec<NodeName>>
            }),
        }
    }

    /// Invokes the connect callback for `peer`.
    pub async fn connect(&self, peer: &NodeName) -> ConnectOutcome {
        (self.connect)(peer.clone()).await
    }

    /// Invokes the disconnect callback for `peer`.
    pub async fn disconnect(&self, peer: &NodeName) -> DisconnectOutcome {
        (self.disconnect)(peer.clone()).await
    }

    /// Asks the transport for the currently connected peers.
    pub async fn list_connected(&self) -> Vec<NodeName> {
        (self.list_connected)().await
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}
