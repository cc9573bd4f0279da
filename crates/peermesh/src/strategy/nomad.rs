//! Nomad services API polling strategy.
//!
//! Polls a Nomad server for the registrations of a named service and forms
//! one `basename@address` peer per registration.

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
const TOKEN_HEADER: &str = "X-Nomad-Token";

/// Configuration for [`Nomad`].
#[derive(Debug, Clone)]
pub struct NomadConfig {
    /// Nomad server base URL, e.g. `http://nomad.service.consul:4646`. Required.
    pub nomad_server_url: String,
    /// Service whose registrations form the peer set. Required.
    pub service_name: String,
    /// Nomad namespace.
    pub namespace: String,
    /// ACL token sent as `X-Nomad-Token`.
    pub token: Option<String>,
    /// Basename of every formed peer. Required.
    pub node_basename: String,
    /// Poll interval.
    pub polling_interval: Duration,
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            nomad_server_url: String::new(),
            service_name: String::new(),
            namespace: "default".to_string(),
            token: None,
            node_basename: String::new(),
            polling_interval: Duration::from_millis(5000),
        }
    }
}

impl NomadConfig {
    /// Creates a configuration for the given server, service and basename.
    #[must_use]
    pub fn new(
        nomad_server_url: impl Into<String>,
        service_name: impl Into<String>,
        node_basename: impl Into<String>,
    ) -> Self {
        Self {
            nomad_server_url: nomad_server_url.into(),
            service_name: service_name.into(),
            node_basename: node_basename.into(),
            ..Self::default()
        }
    }

    /// Sets the Nomad namespace (builder pattern).
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the ACL token (builder pattern).
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the poll interval (builder pattern).
    #[must_use]
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ServiceRegistration {
    #[serde(rename = "Address")]
    address: String,
}

/// Nomad services API discovery.
pub struct Nomad {
    config: NomadConfig,
}

impl Nomad {
    /// Creates the strategy from its configuration.
    #[must_use]
    pub fn new(config: NomadConfig) -> Self {
        Self { config }
    }

    async fn fetch_addresses(&self, client: &reqwest::Client) -> DiscoveryResult<Vec<String>> {
        let url = format!(
            "{}/v1/service/{}?namespace={}",
            self.config.nomad_server_url.trim_end_matches('/'),
            self.config.service_name,
            self.config.namespace
        );
        let mut request = client.get(&url);
        if let Some(token) = &self.config.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Backend {
                backend: "nomad",
                message: format!("services API returned {}: {body}", status.as_u16()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        let registrations: Vec<ServiceRegistration> = serde_json::from_slice(&body)
            .map_err(|e| DiscoveryError::Parse(format!("malformed services document: {e}")))?;
        Ok(registrations.into_iter().map(|r| r.address).collect())
    }
}

#[async_trait]
impl Strategy for Nomad {
    fn name(&self) -> &'static str {
        "nomad"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| DiscoveryError::Backend {
                backend: "nomad",
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let mut interval = tokio::time::interval(self.config.polling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }

            if self.config.nomad_server_url.is_empty()
                || self.config.service_name.is_empty()
                || self.config.node_basename.is_empty()
            {
                warn!(topology = %ctx.topology(),
                    "Nomad polling requires nomad_server_url, service_name and node_basename, doing nothing");
                continue;
            }

            let fetched = tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                result = self.fetch_addresses(&client) => result,
            };
            let desired: HashSet<NodeName> = match fetched {
                Ok(addresses) => {
                    let local = ctx.local_node().clone();
                    addresses
                        .iter()
                        .map(|address| NodeName::new(&self.config.node_basename, address))
                        .filter(|peer| *peer != local)
                        .collect()
                }
                Err(DiscoveryError::Network(e)) => {
                    error!(topology = %ctx.topology(), error = %e,
                        "Nomad API request failed, keeping previous membership");
                    ctx.membership().clone()
                }
                Err(DiscoveryError::Parse(e)) => {
                    debug!(topology = %ctx.topology(), error = %e,
                        "Dropping malformed Nomad services document");
                    ctx.membership().clone()
                }
                Err(e) => {
                    warn!(topology = %ctx.topology(), error = %e,
                        "Nomad API poll failed, keeping previous membership");
                    ctx.membership().clone()
                }
            };

            ctx.reconcile(&desired, true).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_parsing() {
        let body = serde_json::json!([
            {"Address": "10.0.0.1", "Port": 4000, "ServiceName": "app"},
            {"Address": "10.0.0.2", "Port": 4000, "ServiceName": "app"}
        ]);
        let registrations: Vec<ServiceRegistration> = serde_json::from_value(body).unwrap();
        let addresses: Vec<_> = registrations.into_iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
    }

    #[test]
    fn test_config_defaults() {
        let config = NomadConfig::new("http://localhost:4646", "app", "app");
        assert_eq!(config.namespace, "default");
        assert!(config.token.is_none());
    }
}
