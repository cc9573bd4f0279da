//! Discovery strategies.
//!
//! Each strategy implements one mechanism for producing the set of peers the
//! local node should be connected to:
//!
//! - [`StaticHosts`]: fixed host list from configuration
//! - [`LocalDiscovery`]: name registry on the local host
//! - [`HostsFile`]: line-delimited hosts file, names per host via the registry
//! - [`Gossip`]: multicast UDP heartbeats, optionally encrypted
//! - [`DnsPoll`]: periodic A/AAAA resolution
//! - [`DnsSrvPoll`]: periodic SRV resolution (headless-service style)
//! - [`Kubernetes`]: Kubernetes API endpoints/pods polling
//! - [`Rancher`]: Rancher metadata service polling
//! - [`Nomad`]: Nomad services API polling

mod dns;
mod gossip;
mod hosts_file;
mod kubernetes;
mod local;
mod nomad;
mod rancher;
mod static_hosts;

use async_trait::async_trait;

pub use dns::{DnsPoll, DnsPollConfig, DnsSrvPoll, DnsSrvPollConfig};
pub use gossip::{Gossip, GossipConfig};
pub use hosts_file::{HostsFile, HostsFileConfig};
pub use kubernetes::{AddressMode, IpLookupMode, Kubernetes, KubernetesConfig};
pub use local::LocalDiscovery;
pub use nomad::{Nomad, NomadConfig};
pub use rancher::{Rancher, RancherConfig};
pub use static_hosts::{StaticHosts, StaticHostsConfig};

use crate::error::DiscoveryResult;
use crate::topology::TopologyContext;

/// A concrete discovery mechanism run by a topology worker.
///
/// `run` drives the whole worker: a one-shot strategy performs its work and
/// returns `Ok(())` ("done"; the worker is not restarted), while a periodic
/// strategy loops until the context signals shutdown and then returns
/// `Ok(())`. An `Err` is a worker crash and triggers a one-for-one restart by
/// the supervisor.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short identifier used in logs and supervisor child labels.
    fn name(&self) -> &'static str;

    /// Runs the worker to completion.
    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()>;
}

/// The cluster-local DNS domain: `CLUSTER_DOMAIN` from the environment when
/// set, otherwise the given default.
pub(crate) fn cluster_domain(default: &str) -> String {
    std::env::var("CLUSTER_DOMAIN").unwrap_or_else(|_| default.to_string())
}
