//! DNS resolution seam.
//!
//! The DNS-backed strategies resolve through this trait so tests can inject a
//! canned resolver. The default implementation uses hickory's tokio resolver
//! with the system configuration.

use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::Resolver;

use crate::error::{DiscoveryError, DiscoveryResult};

/// A/AAAA and SRV resolution.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolves `name` to its IPv4 and IPv6 addresses.
    async fn lookup_ip(&self, name: &str) -> DiscoveryResult<Vec<IpAddr>>;

    /// Resolves SRV records for `name`, returning the target hostnames with
    /// any trailing dot trimmed.
    async fn lookup_srv(&self, name: &str) -> DiscoveryResult<Vec<String>>;
}

/// Resolver backed by the system DNS configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    fn build() -> DiscoveryResult<hickory_resolver::TokioResolver> {
        Ok(Resolver::builder_tokio()
            .map_err(|e| DiscoveryError::DnsResolution(format!("failed to create resolver: {e}")))?
            .build())
    }
}

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup_ip(&self, name: &str) -> DiscoveryResult<Vec<IpAddr>> {
        let resolver = Self::build()?;
        let lookup = resolver
            .lookup_ip(name)
            .await
            .map_err(|e| DiscoveryError::DnsResolution(format!("{name}: {e}")))?;
        Ok(lookup.iter().collect())
    }

    async fn lookup_srv(&self, name: &str) -> DiscoveryResult<Vec<String>> {
        let resolver = Self::build()?;
        let lookup = resolver
            .srv_lookup(name)
            .await
            .map_err(|e| DiscoveryError::DnsResolution(format!("SRV {name}: {e}")))?;
        Ok(lookup
            .iter()
            .map(|srv| srv.target().to_string().trim_end_matches('.').to_string())
            .collect())
    }
}
