//! DNS polling strategies.
//!
//! [`DnsPoll`] resolves a name to its A/AAAA records and treats each address
//! as a peer; [`DnsSrvPoll`] resolves a headless-service style SRV query and
//! treats each target hostname as a peer. Both preserve the previous
//! membership across resolution failures.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{cluster_domain, Strategy};
use crate::error::DiscoveryResult;
use crate::node::NodeName;
use crate::resolve::{Resolve, SystemResolver};
use crate::topology::TopologyContext;

/// Configuration for [`DnsPoll`].
#[derive(Debug, Clone)]
pub struct DnsPollConfig {
    /// FQDN to resolve.
    pub query: String,
    /// Basename composed with each resolved address.
    pub node_basename: String,
    /// Poll interval.
    pub polling_interval: Duration,
    /// Disconnect peers whose address disappeared from the answer.
    pub prune: bool,
}

impl Default for DnsPollConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            node_basename: String::new(),
            polling_interval: Duration::from_millis(5000),
            prune: true,
        }
    }
}

impl DnsPollConfig {
    /// Creates a configuration for the given query and basename.
    #[must_use]
    pub fn new(query: impl Into<String>, node_basename: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            node_basename: node_basename.into(),
            ..Self::default()
        }
    }

    /// Sets the poll interval (builder pattern).
    #[must_use]
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Controls pruning of vanished peers (builder pattern).
    #[must_use]
    pub const fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }
}

/// Periodic A/AAAA discovery.
pub struct DnsPoll {
    config: DnsPollConfig,
    resolver: Arc<dyn Resolve>,
}

impl DnsPoll {
    /// Creates the strategy with the system resolver.
    #[must_use]
    pub fn new(config: DnsPollConfig) -> Self {
        Self {
            config,
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Uses a custom resolver (for tests).
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }
}

#[async_trait]
impl Strategy for DnsPoll {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let mut interval = tokio::time::interval(self.config.polling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }

            if self.config.query.is_empty() || self.config.node_basename.is_empty() {
                warn!(topology = %ctx.topology(),
                    "DNS polling requires both query and node_basename, doing nothing");
                continue;
            }

            let resolved = tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                result = self.resolver.lookup_ip(&self.config.query) => result,
            };
            match resolved {
                Ok(addresses) => {
                    let local = ctx.local_node().clone();
                    let desired: HashSet<NodeName> = addresses
                        .iter()
                        .map(|ip| NodeName::new(&self.config.node_basename, &ip.to_string()))
                        .filter(|peer| *peer != local)
                        .collect();
                    ctx.reconcile(&desired, self.config.prune).await;
                }
                Err(e) => {
                    warn!(topology = %ctx.topology(), query = %self.config.query,
                        error = %e, "DNS resolution failed, keeping previous membership");
                }
            }
        }
    }
}

/// Configuration for [`DnsSrvPoll`].
#[derive(Debug, Clone)]
pub struct DnsSrvPollConfig {
    /// Service part of the SRV query.
    pub service: String,
    /// Namespace part of the SRV query.
    pub namespace: String,
    /// Basename composed with each SRV target.
    pub application_name: String,
    /// Poll interval.
    pub polling_interval: Duration,
}

impl Default for DnsSrvPollConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            namespace: String::new(),
            application_name: String::new(),
            polling_interval: Duration::from_millis(5000),
        }
    }
}

impl DnsSrvPollConfig {
    /// Creates a configuration for the given service coordinates.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        namespace: impl Into<String>,
        application_name: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            namespace: namespace.into(),
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Sets the poll interval (builder pattern).
    #[must_use]
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }
}

/// Periodic SRV discovery for headless services.
pub struct DnsSrvPoll {
    config: DnsSrvPollConfig,
    resolver: Arc<dyn Resolve>,
}

impl DnsSrvPoll {
    /// Creates the strategy with the system resolver.
    #[must_use]
    pub fn new(config: DnsSrvPollConfig) -> Self {
        Self {
            config,
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Uses a custom resolver (for tests).
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolve>) -> Self {
        self.resolver = resolver;
        self
    }

    fn srv_query(&self) -> String {
        format!(
            "{}.{}.svc.{}",
            self.config.service,
            self.config.namespace,
            cluster_domain("cluster.local.")
        )
    }
}

#[async_trait]
impl Strategy for DnsSrvPoll {
    fn name(&self) -> &'static str {
        "dns-srv"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let mut interval = tokio::time::interval(self.config.polling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }

            if self.config.service.is_empty()
                || self.config.namespace.is_empty()
                || self.config.application_name.is_empty()
            {
                warn!(topology = %ctx.topology(),
                    "SRV polling requires service, namespace and application_name, doing nothing");
                continue;
            }

            let query = self.srv_query();
            let resolved = tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                result = self.resolver.lookup_srv(&query) => result,
            };
            match resolved {
                Ok(targets) => {
                    let local = ctx.local_node().clone();
                    let desired: HashSet<NodeName> = targets
                        .iter()
                        .map(|target| NodeName::new(&self.config.application_name, target))
                        .filter(|peer| *peer != local)
                        .collect();
                    ctx.reconcile(&desired, true).await;
                }
                Err(e) => {
                    warn!(topology = %ctx.topology(), query = %query, error = %e,
                        "SRV resolution failed, keeping previous membership");
                }
            }
        }
    }
}
