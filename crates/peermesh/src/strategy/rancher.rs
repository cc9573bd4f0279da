//! Rancher metadata polling strategy.
//!
//! Polls the Rancher metadata service for the containers of the service the
//! local node runs in and forms one `basename@ip` peer per container.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::Strategy;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::node::NodeName;
use crate::topology::TopologyContext;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for [`Rancher`].
#[derive(Debug, Clone)]
pub struct RancherConfig {
    /// Basename of every formed peer. Required.
    pub node_basename: String,
    /// Poll interval.
    pub polling_interval: Duration,
    /// Metadata service base URL; overridable for tests.
    pub metadata_base_url: String,
}

impl Default for RancherConfig {
    fn default() -> Self {
        Self {
            node_basename: String::new(),
            polling_interval: Duration::from_millis(5000),
            metadata_base_url: "http://rancher-metadata".to_string(),
        }
    }
}

impl RancherConfig {
    /// Creates a configuration for the given basename.
    #[must_use]
    pub fn new(node_basename: impl Into<String>) -> Self {
        Self {
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

    /// Overrides the metadata service base URL (builder pattern; for tests).
    #[must_use]
    pub fn with_metadata_base_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_base_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct SelfService {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    #[serde(default)]
    primary_ip: Option<String>,
}

/// Rancher metadata discovery.
pub struct Rancher {
    config: RancherConfig,
}

impl Rancher {
    /// Creates the strategy from its configuration.
    #[must_use]
    pub fn new(config: RancherConfig) -> Self {
        Self { config }
    }

    async fn fetch_ips(&self, client: &reqwest::Client) -> DiscoveryResult<Vec<String>> {
        let url = format!(
            "{}/latest/self/service",
            self.config.metadata_base_url.trim_end_matches('/')
        );
        let response = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Backend {
                backend: "rancher",
                message: format!("metadata service returned {}: {body}", status.as_u16()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        let service: SelfService = serde_json::from_slice(&body)
            .map_err(|e| DiscoveryError::Parse(format!("malformed metadata document: {e}")))?;
        Ok(service
            .containers
            .into_iter()
            .filter_map(|container| container.primary_ip)
            .collect())
    }
}

#[async_trait]
impl Strategy for Rancher {
    fn name(&self) -> &'static str {
        "rancher"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| DiscoveryError::Backend {
                backend: "rancher",
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let mut interval = tokio::time::interval(self.config.polling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }

            if self.config.node_basename.is_empty() {
                warn!(topology = %ctx.topology(),
                    "Rancher polling requires node_basename, doing nothing");
                continue;
            }

            let fetched = tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                result = self.fetch_ips(&client) => result,
            };
            let desired: HashSet<NodeName> = match fetched {
                Ok(ips) => {
                    let local = ctx.local_node().clone();
                    ips.iter()
                        .map(|ip| NodeName::new(&self.config.node_basename, ip))
                        .filter(|peer| *peer != local)
                        .collect()
                }
                Err(DiscoveryError::Network(e)) => {
                    error!(topology = %ctx.topology(), error = %e,
                        "Rancher metadata request failed, keeping previous membership");
                    ctx.membership().clone()
                }
                Err(DiscoveryError::Parse(e)) => {
                    debug!(topology = %ctx.topology(), error = %e,
                        "Dropping malformed Rancher metadata document");
                    ctx.membership().clone()
                }
                Err(e) => {
                    warn!(topology = %ctx.topology(), error = %e,
                        "Rancher metadata poll failed, keeping previous membership");
                    ctx.membership().clone()
                }
            };

            ctx.reconcile(&desired, true).await;
        }
    }
}
