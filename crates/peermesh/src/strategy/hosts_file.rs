//! Hosts-file discovery.
//!
//! Reads a line-delimited file of host names, asks the name registry on each
//! host for its registered basenames, and reconciles against the composed
//! `basename@host` peers. The file is re-read on every periodic run so hosts
//! can be added or removed live.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::Strategy;
use crate::epmd::{EpmdRegistry, NameRegistry};
use crate::error::DiscoveryResult;
use crate::node::NodeName;
use crate::topology::TopologyContext;

/// Configuration for [`HostsFile`].
#[derive(Debug, Clone)]
pub struct HostsFileConfig {
    /// File with one host name per line.
    pub path: PathBuf,
    /// Re-run interval; `None` makes the strategy a one-shot.
    pub timeout: Option<Duration>,
}

impl HostsFileConfig {
    /// Creates a configuration for the given file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: None,
        }
    }

    /// Sets the re-run interval (builder pattern).
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Hosts-file discovery through the per-host name registry.
pub struct HostsFile {
    config: HostsFileConfig,
    registry: Arc<dyn NameRegistry>,
}

impl HostsFile {
    /// Creates the strategy with the default registry client.
    #[must_use]
    pub fn new(config: HostsFileConfig) -> Self {
        Self {
            config,
            registry: Arc::new(EpmdRegistry::new()),
        }
    }

    /// Uses a custom name registry (for tests or non-standard setups).
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn NameRegistry>) -> Self {
        self.registry = registry;
        self
    }

    async fn discover(
        &self,
        topology: &str,
        local: &NodeName,
        hosts: &[String],
    ) -> HashSet<NodeName> {
        let mut desired = HashSet::new();
        for host in hosts {
            match self.registry.names(host).await {
                Ok(names) => {
                    desired.extend(names.iter().map(|basename| NodeName::new(basename, host)));
                }
                Err(e) => {
                    warn!(topology, host = %host, error = %e, "Name registry unreachable");
                }
            }
        }
        desired.remove(local);
        desired
    }

    async fn read_hosts(&self) -> std::io::Result<Vec<String>> {
        let contents = tokio::fs::read_to_string(&self.config.path).await?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}

#[async_trait]
impl Strategy for HostsFile {
    fn name(&self) -> &'static str {
        "hosts-file"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let topology = ctx.topology().to_string();
        let local = ctx.local_node().clone();

        let hosts = match self.read_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(topology = %topology, path = %self.config.path.display(),
                    error = %e, "Hosts file unreadable, nothing to do");
                return Ok(());
            }
        };

        let desired = self.discover(&topology, &local, &hosts).await;
        ctx.reconcile(&desired, true).await;

        let Some(timeout) = self.config.timeout else {
            return Ok(());
        };

        let mut interval = tokio::time::interval(timeout);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }
            match self.read_hosts().await {
                Ok(hosts) => {
                    let desired = tokio::select! {
                        _ = ctx.shutdown_signalled() => return Ok(()),
                        desired = self.discover(&topology, &local, &hosts) => desired,
                    };
                    ctx.reconcile(&desired, true).await;
                }
                Err(e) => {
                    warn!(topology = %topology, path = %self.config.path.display(),
                        error = %e, "Hosts file unreadable, keeping previous membership");
                }
            }
        }
    }
}
