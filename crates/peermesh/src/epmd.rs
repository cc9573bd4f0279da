//! Local name-registry access.
//!
//! The local and hosts-file strategies ask the name registry on a host which
//! node basenames are registered there. The default implementation speaks the
//! EPMD wire protocol: a `NAMES_REQ` (2-byte big-endian length, opcode 110)
//! over TCP port 4369, answered by a 4-byte port number followed by one
//! `name <basename> at port <port>` line per registered node.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{DiscoveryError, DiscoveryResult};

/// Default registry port.
pub const EPMD_PORT: u16 = 4369;

const NAMES_REQ: u8 = 110;

/// A registry of node basenames per host.
#[async_trait]
pub trait NameRegistry: Send + Sync {
    /// Returns the node basenames registered on `host`.
    async fn names(&self, host: &str) -> DiscoveryResult<Vec<String>>;
}

/// Registry client speaking the EPMD protocol.
#[derive(Debug, Clone)]
pub struct EpmdRegistry {
    port: u16,
}

impl Default for EpmdRegistry {
    fn default() -> Self {
        Self { port: EPMD_PORT }
    }
}

impl EpmdRegistry {
    /// Creates a client against the default registry port.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client against a non-standard registry port.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl NameRegistry for EpmdRegistry {
    async fn names(&self, host: &str) -> DiscoveryResult<Vec<String>> {
        let mut stream = TcpStream::connect((host, self.port)).await.map_err(|e| {
            DiscoveryError::Network(format!(
                "name registry at {host}:{} unreachable: {e}",
                self.port
            ))
        })?;

        // Request: u16 length prefix (the opcode alone), then NAMES_REQ.
        stream.write_all(&[0, 1, NAMES_REQ]).await?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        if reply.len() < 4 {
            return Err(DiscoveryError::Network(format!(
                "short reply from name registry at {host}:{}",
                self.port
            )));
        }

        // The first 4 bytes carry the registry's own port; the rest is text.
        Ok(parse_names(&String::from_utf8_lossy(&reply[4..])))
    }
}

/// Parses `name <basename> at port <port>` lines, skipping anything else.
pub(crate) fn parse_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("name ")?;
            let (basename, _) = rest.split_once(" at port ")?;
            Some(basename.to_string())
        })
        .collect()
}
