//! Peer node identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// An addressable node identity of the form `basename@host`.
///
/// The host part may be a hostname, an IPv4/IPv6 address, or a fully
/// qualified DNS name; the core never interprets it. Names compare by value
/// and are immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Composes a node name from its basename and host parts.
    #[must_use]
    pub fn new(basename: &str, host: &str) -> Self {
        Self(format!("{basename}@{host}"))
    }

    /// The part before the first `@`.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.0.split_once('@').map_or(self.0.as_str(), |(b, _)| b)
    }

    /// The part after the first `@`.
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.split_once('@').map_or("", |(_, h)| h)
    }

    /// The full `basename@host` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for NodeName {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((basename, host)) if !basename.is_empty() && !host.is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(DiscoveryError::Config(format!(
                "invalid node name '{s}': expected basename@host"
            ))),
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
