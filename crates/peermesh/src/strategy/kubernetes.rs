//! Kubernetes API polling strategy.
//!
//! Polls the Kubernetes API for the endpoints (or pods) matching a label
//! selector and forms one peer per discovered address. Authentication uses
//! the projected service-account token; the API's CA certificate is trusted
//! when present. Transient API failures preserve the previous membership so
//! an auth blip or a rolling apiserver never disconnects the cluster.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::{cluster_domain, Strategy};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::node::NodeName;
use crate::topology::TopologyContext;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Which API collection supplies the peer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpLookupMode {
    /// `endpoints` of the selected services.
    #[default]
    Endpoints,
    /// `pods` matching the selector directly.
    Pods,
}

/// How a discovered address becomes the host part of a peer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// `basename@<pod ip>`.
    #[default]
    Ip,
    /// `basename@<hostname>.<service>.<namespace>.svc.<cluster>.local`.
    Hostname,
    /// `basename@<ip with dots replaced by dashes>.<namespace>.pod.<cluster>.local`.
    Dns,
}

/// Configuration for [`Kubernetes`].
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// Basename of every formed peer. Required.
    pub node_basename: String,
    /// Label selector identifying cluster members. Required.
    pub selector: String,
    /// Namespace to query; defaults to the service account's namespace file.
    pub namespace: Option<String>,
    /// API server host.
    pub master: String,
    /// Service name used by [`AddressMode::Hostname`].
    pub service_name: String,
    /// Projected service-account directory (token, ca.crt, namespace).
    pub service_account_path: PathBuf,
    /// Whether peers come from endpoints or pods.
    pub ip_lookup_mode: IpLookupMode,
    /// Ask the API for possibly-stale cached resources (`resourceVersion=0`).
    pub use_cached_resources: bool,
    /// Cluster name composed into the cluster-local DNS suffix.
    pub cluster_name: String,
    /// Peer host formation mode.
    pub mode: AddressMode,
    /// Poll interval.
    pub polling_interval: Duration,
    /// Full API base URL override; replaces the computed `https://` apex.
    /// Intended for tests against a mock server.
    pub api_base_url: Option<String>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            node_basename: String::new(),
            selector: String::new(),
            namespace: None,
            master: "kubernetes.default.svc".to_string(),
            service_name: String::new(),
            service_account_path: PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount"),
            ip_lookup_mode: IpLookupMode::default(),
            use_cached_resources: false,
            cluster_name: "cluster".to_string(),
            mode: AddressMode::default(),
            polling_interval: Duration::from_millis(5000),
            api_base_url: None,
        }
    }
}

impl KubernetesConfig {
    /// Creates a configuration for the given basename and selector.
    #[must_use]
    pub fn new(node_basename: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            node_basename: node_basename.into(),
            selector: selector.into(),
            ..Self::default()
        }
    }

    /// Sets the namespace (builder pattern).
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the API server host (builder pattern).
    #[must_use]
    pub fn with_master(mut self, master: impl Into<String>) -> Self {
        self.master = master.into();
        self
    }

    /// Sets the service name used in hostname mode (builder pattern).
    #[must_use]
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    /// Sets the projected service-account directory (builder pattern).
    #[must_use]
    pub fn with_service_account_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.service_account_path = path.into();
        self
    }

    /// Selects endpoints or pods lookup (builder pattern).
    #[must_use]
    pub const fn with_ip_lookup_mode(mut self, mode: IpLookupMode) -> Self {
        self.ip_lookup_mode = mode;
        self
    }

    /// Allows cached resource versions (builder pattern).
    #[must_use]
    pub const fn with_use_cached_resources(mut self, cached: bool) -> Self {
        self.use_cached_resources = cached;
        self
    }

    /// Sets the cluster name (builder pattern).
    #[must_use]
    pub fn with_cluster_name(mut self, cluster_name: impl Into<String>) -> Self {
        self.cluster_name = cluster_name.into();
        self
    }

    /// Sets the peer host formation mode (builder pattern).
    #[must_use]
    pub const fn with_mode(mut self, mode: AddressMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the poll interval (builder pattern).
    #[must_use]
    pub const fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Overrides the computed API base URL (builder pattern; for tests).
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }
}

/// One discovered address before peer-name formation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Address {
    ip: String,
    namespace: String,
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndpointsList {
    #[serde(default)]
    items: Vec<EndpointsItem>,
}

#[derive(Debug, Deserialize)]
struct EndpointsItem {
    #[serde(default)]
    subsets: Vec<EndpointSubset>,
}

#[derive(Debug, Deserialize)]
struct EndpointSubset {
    #[serde(default)]
    addresses: Vec<EndpointAddress>,
}

#[derive(Debug, Deserialize)]
struct EndpointAddress {
    ip: String,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default, rename = "targetRef")]
    target_ref: Option<TargetRef>,
}

#[derive(Debug, Deserialize)]
struct TargetRef {
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
struct PodItem {
    #[serde(default)]
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
struct PodMetadata {
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default, rename = "podIP")]
    pod_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

/// Kubernetes API discovery.
pub struct Kubernetes {
    config: KubernetesConfig,
}

impl Kubernetes {
    /// Creates the strategy from its configuration.
    #[must_use]
    pub fn new(config: KubernetesConfig) -> Self {
        Self { config }
    }

    fn cluster_dns_domain(&self) -> String {
        cluster_domain(&format!("{}.local", self.config.cluster_name))
    }

    /// The API apex: the configured master is used verbatim when it already
    /// carries the cluster domain (or a trailing dot); otherwise the cluster
    /// domain is appended.
    fn base_url(&self) -> String {
        if let Some(url) = &self.config.api_base_url {
            return url.trim_end_matches('/').to_string();
        }
        let domain = self.cluster_dns_domain();
        let master = &self.config.master;
        if master.ends_with(&domain) || master.ends_with('.') {
            format!("https://{master}")
        } else {
            format!("https://{master}.{domain}")
        }
    }

    fn api_url(&self, namespace: &str) -> String {
        let resource = match self.config.ip_lookup_mode {
            IpLookupMode::Endpoints => "endpoints",
            IpLookupMode::Pods => "pods",
        };
        let selector = utf8_percent_encode(&self.config.selector, NON_ALPHANUMERIC);
        let mut url = format!(
            "{}/api/v1/namespaces/{namespace}/{resource}?labelSelector={selector}",
            self.base_url()
        );
        if self.config.use_cached_resources {
            url.push_str("&resourceVersion=0");
        }
        url
    }

    async fn read_token(&self) -> String {
        match tokio::fs::read_to_string(self.config.service_account_path.join("token")).await {
            Ok(token) => token.trim().to_string(),
            Err(_) => String::new(),
        }
    }

    async fn namespace(&self) -> String {
        if let Some(namespace) = &self.config.namespace {
            return namespace.clone();
        }
        match tokio::fs::read_to_string(self.config.service_account_path.join("namespace")).await {
            Ok(namespace) => namespace.trim().to_string(),
            Err(_) => String::new(),
        }
    }

    async fn build_client(&self) -> DiscoveryResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(HTTP_TIMEOUT);
        match tokio::fs::read(self.config.service_account_path.join("ca.crt")).await {
            Ok(pem) => {
                let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    DiscoveryError::Config(format!("invalid service-account CA certificate: {e}"))
                })?;
                builder = builder.add_root_certificate(cert);
            }
            Err(_) => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        builder.build().map_err(|e| DiscoveryError::Backend {
            backend: "kubernetes",
            message: format!("failed to build HTTP client: {e}"),
        })
    }

    async fn fetch_addresses(
        &self,
        client: &reqwest::Client,
        namespace: &str,
    ) -> DiscoveryResult<Vec<Address>> {
        let url = self.api_url(namespace);
        let mut request = client.get(&url);
        let token = self.read_token().await;
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;

        if status == reqwest::StatusCode::FORBIDDEN {
            let message = serde_json::from_slice::<ApiStatus>(&body)
                .map(|s| s.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string());
            return Err(DiscoveryError::Backend {
                backend: "kubernetes",
                message: format!("cannot query API (unauthorized): {message}"),
            });
        }
        if !status.is_success() {
            return Err(DiscoveryError::Backend {
                backend: "kubernetes",
                message: format!(
                    "API returned {}: {}",
                    status.as_u16(),
                    String::from_utf8_lossy(&body)
                ),
            });
        }

        match self.config.ip_lookup_mode {
            IpLookupMode::Endpoints => {
                let list: EndpointsList = serde_json::from_slice(&body).map_err(|e| {
                    DiscoveryError::Parse(format!("malformed endpoints document: {e}"))
                })?;
                Ok(list
                    .items
                    .into_iter()
                    .flat_map(|item| item.subsets)
                    .flat_map(|subset| subset.addresses)
                    .map(|address| Address {
                        ip: address.ip,
                        namespace: address
                            .target_ref
                            .and_then(|r| r.namespace)
                            .unwrap_or_else(|| namespace.to_string()),
                        hostname: address.hostname,
                    })
                    .collect())
            }
            IpLookupMode::Pods => {
                let list: PodList = serde_json::from_slice(&body).map_err(|e| {
                    DiscoveryError::Parse(format!("malformed pod document: {e}"))
                })?;
                Ok(list
                    .items
                    .into_iter()
                    .filter_map(|item| {
                        let ip = item.status.pod_ip?;
                        Some(Address {
                            ip,
                            namespace: item
                                .metadata
                                .namespace
                                .unwrap_or_else(|| namespace.to_string()),
                            hostname: item.spec.hostname,
                        })
                    })
                    .collect())
            }
        }
    }

    fn format_peer(&self, address: &Address) -> Option<NodeName> {
        let basename = &self.config.node_basename;
        let cluster = &self.config.cluster_name;
        match self.config.mode {
            AddressMode::Ip => Some(NodeName::new(basename, &address.ip)),
            AddressMode::Hostname => {
                let Some(hostname) = &address.hostname else {
                    debug!(ip = %address.ip, "Skipping address without hostname");
                    return None;
                };
                Some(NodeName::new(
                    basename,
                    &format!(
                        "{hostname}.{}.{}.svc.{cluster}.local",
                        self.config.service_name, address.namespace
                    ),
                ))
            }
            AddressMode::Dns => {
                let dashed = address.ip.replace('.', "-");
                Some(NodeName::new(
                    basename,
                    &format!("{dashed}.{}.pod.{cluster}.local", address.namespace),
                ))
            }
        }
    }
}

#[async_trait]
impl Strategy for Kubernetes {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let client = self.build_client().await?;
        let mut interval = tokio::time::interval(self.config.polling_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                _ = interval.tick() => {}
            }

            if self.config.node_basename.is_empty() || self.config.selector.is_empty() {
                warn!(topology = %ctx.topology(),
                    "Kubernetes polling requires node_basename and selector, doing nothing");
                continue;
            }

            let namespace = self.namespace().await;
            // Shutdown abandons an in-flight request; its result is not needed.
            let fetched = tokio::select! {
                _ = ctx.shutdown_signalled() => return Ok(()),
                result = self.fetch_addresses(&client, &namespace) => result,
            };
            let desired: HashSet<NodeName> = match fetched {
                Ok(addresses) => {
                    let local = ctx.local_node().clone();
                    addresses
                        .iter()
                        .filter_map(|address| self.format_peer(address))
                        .filter(|peer| *peer != local)
                        .collect()
                }
                Err(DiscoveryError::Network(e)) => {
                    error!(topology = %ctx.topology(), error = %e,
                        "Kubernetes API request failed, keeping previous membership");
                    ctx.membership().clone()
                }
                Err(DiscoveryError::Parse(e)) => {
                    debug!(topology = %ctx.topology(), error = %e,
                        "Dropping malformed Kubernetes API document");
                    ctx.membership().clone()
                }
                Err(e) => {
                    warn!(topology = %ctx.topology(), error = %e,
                        "Kubernetes API poll failed, keeping previous membership");
                    ctx.membership().clone()
                }
            };

            ctx.reconcile(&desired, true).await;
        }
    }
}
