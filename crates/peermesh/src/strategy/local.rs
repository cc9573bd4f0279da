//! Local-host discovery.
//!
//! Asks the name registry on the local host which basenames are registered,
//! composes peers on the local node's own host suffix, and reconciles once.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::Strategy;
use crate::epmd::{EpmdRegistry, NameRegistry};
use crate::error::DiscoveryResult;
use crate::node::NodeName;
use crate::topology::TopologyContext;

/// One-shot discovery of co-located nodes through the local name registry.
pub struct LocalDiscovery {
    registry: Arc<dyn NameRegistry>,
}

impl Default for LocalDiscovery {
    fn default() -> Self {
        Self {
            registry: Arc::new(EpmdRegistry::new()),
        }
    }
}

impl LocalDiscovery {
    /// Creates the strategy against the default local registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom name registry (for tests or non-standard setups).
    #[must_use]
    pub fn with_registry(registry: Arc<dyn NameRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Strategy for LocalDiscovery {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let names = match self.registry.names("127.0.0.1").await {
            Ok(names) => names,
            Err(e) => {
                warn!(topology = %ctx.topology(), error = %e,
                    "Local name registry unavailable, nothing to do");
                return Ok(());
            }
        };

        // Registered names carry no host part; co-located nodes share ours.
        let host = ctx.local_node().host().to_string();
        let local = ctx.local_node().clone();
        let desired: HashSet<NodeName> = names
            .iter()
            .map(|basename| NodeName::new(basename, &host))
            .filter(|peer| *peer != local)
            .collect();

        ctx.reconcile(&desired, true).await;
        Ok(())
    }
}
