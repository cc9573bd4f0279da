//! Fixed host-list strategy.
//!
//! Contacts a configured list of peers once and exits, or — when a re-run
//! interval is set — keeps reconciling against the same list so transient
//! connection failures are eventually repaired.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::Strategy;
use crate::error::DiscoveryResult;
use crate::node::NodeName;
use crate::topology::TopologyContext;

/// Configuration for [`StaticHosts`].
#[derive(Debug, Clone, Default)]
pub struct StaticHostsConfig {
    /// Peers to contact.
    pub hosts: Vec<NodeName>,
    /// Re-reconcile interval; `None` makes the strategy a one-shot.
    pub timeout: Option<Duration>,
}

impl StaticHostsConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host (builder pattern).
    #[must_use]
    pub fn with_host(mut self, host: NodeName) -> Self {
        self.hosts.push(host);
        self
    }

    /// Adds multiple hosts (builder pattern).
    #[must_use]
    pub fn with_hosts(mut self, hosts: impl IntoIterator<Item = NodeName>) -> Self {
        self.hosts.extend(hosts);
        self
    }

    /// Sets the re-reconcile interval (builder pattern).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fixed host-list discovery.
#[derive(Debug, Clone)]
pub struct StaticHosts {
    config: StaticHostsConfig,
}

impl StaticHosts {
    /// Creates the strategy from its configuration.
    #[must_use]
    pub fn new(config: StaticHostsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Strategy for StaticHosts {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        if self.config.hosts.is_empty() {
            debug!(topology = %ctx.topology(), "No hosts configured, nothing to do");
            return Ok(());
        }

        let desired: HashSet<NodeName> = self.config.hosts.iter().cloned().collect();
        ctx.reconcile(&desired, true).await;

        let Some(timeout) = self.config.timeout else {
            return Ok(());
        };

        let mut interval = tokio::time::interval(timeout);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }
            ctx.reconcile(&desired, true).await;
        }
    }
}
