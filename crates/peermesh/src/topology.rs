//! Topology wiring: per-topology specification and per-worker state.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::callbacks::Callbacks;
use crate::node::NodeName;
use crate::strategy::Strategy;

/// One configured topology: a name binding a discovery strategy to the
/// callbacks that drive the transport.
pub struct TopologySpec {
    pub(crate) name: String,
    pub(crate) strategy: Box<dyn Strategy>,
    pub(crate) callbacks: Option<Callbacks>,
}

impl TopologySpec {
    /// Creates a topology running `strategy` under `name`.
    pub fn new<S: Strategy + 'static>(name: impl Into<String>, strategy: S) -> Self {
        Self {
            name: name.into(),
            strategy: Box::new(strategy),
            callbacks: None,
        }
    }

    /// Overrides the supervisor-wide default callbacks for this topology.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// The topology name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for TopologySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologySpec")
            .field("name", &self.name)
            .field("strategy", &self.strategy.name())
            .finish_non_exhaustive()
    }
}

/// Supervisor-wide options shared by every topology.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub(crate) local_node: NodeName,
    pub(crate) default_callbacks: Option<Callbacks>,
}

impl SupervisorOptions {
    /// Creates options for a supervisor running as `local_node`.
    #[must_use]
    pub fn new(local_node: NodeName) -> Self {
        Self {
            local_node,
            default_callbacks: None,
        }
    }

    /// Sets the callbacks used by topologies that do not carry their own.
    #[must_use]
    pub fn with_default_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.default_callbacks = Some(callbacks);
        self
    }
}

/// Mutable per-worker state, owned by the worker's single task.
///
/// A context is handed to [`Strategy::run`](crate::strategy::Strategy::run)
/// and every state transition — membership updates, shutdown observation —
/// happens inside that one task, so no locking is needed.
pub struct TopologyContext {
    topology: String,
    local_node: NodeName,
    callbacks: Callbacks,
    membership: HashSet<NodeName>,
    shutdown: mpsc::Receiver<()>,
}

impl TopologyContext {
    /// Creates a context and the sender used to signal shutdown.
    ///
    /// The supervisor builds one per worker; embedders running a single
    /// strategy by hand can do the same.
    pub fn new(
        topology: impl Into<String>,
        local_node: NodeName,
        callbacks: Callbacks,
    ) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                topology: topology.into(),
                local_node,
                callbacks,
                membership: HashSet::new(),
                shutdown: rx,
            },
            tx,
        )
    }

    /// The topology name, used as the log prefix.
    #[must_use]
    pub fn topology(&self) -> &str {
        &self.topology
    }

    /// The local node's name; never part of the membership set.
    #[must_use]
    pub fn local_node(&self) -> &NodeName {
        &self.local_node
    }

    /// The callbacks driving the transport.
    #[must_use]
    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    /// The carry-forward membership set from the last reconcile.
    #[must_use]
    pub fn membership(&self) -> &HashSet<NodeName> {
        &self.membership
    }

    /// Runs one reconcile cycle against `desired` and stores the new
    /// carry-forward set.
    pub async fn reconcile(&mut self, desired: &HashSet<NodeName>, prune: bool) {
        self.membership = crate::reconcile::reconcile(
            &self.topology,
            &self.local_node,
            &self.callbacks,
            desired,
            &self.membership,
            prune,
        )
        .await;
    }

    /// Resolves when the supervisor requests shutdown (or is dropped).
    pub async fn shutdown_signalled(&mut self) {
        let _ = self.shutdown.recv().await;
    }

    /// Clears worker-owned state; called before a restart.
    pub(crate) fn reset(&mut self) {
        self.membership.clear();
    }
}

impl std::fmt::Debug for TopologyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyContext")
            .field("topology", &self.topology)
            .field("local_node", &self.local_node)
            .field("membership", &self.membership)
            .finish_non_exhaustive()
    }
}
