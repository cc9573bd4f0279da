//! Multicast UDP gossip strategy.
//!
//! Workers announce themselves with a `heartbeat::`-framed datagram on a
//! multicast group and connect to any peer they hear from. Heartbeats are
//! resent after a uniformly random delay so co-started nodes do not
//! synchronize their emission. An optional shared secret seals every packet
//! with AES-256-CBC (see [`crate::crypto`]).

use std::borrow::Cow;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::Strategy;
use crate::crypto::PacketCipher;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::node::NodeName;
use crate::topology::TopologyContext;

/// Every gossip datagram starts with this sentinel, byte-exact for wire
/// compatibility across versions.
const HEARTBEAT_PREFIX: &[u8] = b"heartbeat::";

/// Longest datagram a worker will process.
const MAX_DATAGRAM: usize = 1500;

/// Upper bound of the random resend delay, in milliseconds.
const MAX_JITTER_MS: u64 = 5000;

/// Configuration for [`Gossip`].
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// UDP port to bind and address heartbeats to.
    pub port: u16,
    /// Interface address to bind.
    pub if_addr: Ipv4Addr,
    /// Multicast group heartbeats are sent to.
    pub multicast_addr: Ipv4Addr,
    /// TTL of emitted multicast packets.
    pub multicast_ttl: u32,
    /// Outbound interface for multicast, when not the bind interface.
    pub multicast_if: Option<Ipv4Addr>,
    /// Skip multicast group membership and rely on broadcast addressing.
    pub broadcast_only: bool,
    /// Shared secret; when set, packets are sealed with AES-256-CBC.
    pub secret: Option<String>,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            port: 45892,
            if_addr: Ipv4Addr::UNSPECIFIED,
            multicast_addr: Ipv4Addr::new(233, 252, 1, 32),
            multicast_ttl: 1,
            multicast_if: None,
            broadcast_only: false,
            secret: None,
        }
    }
}

impl GossipConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the UDP port (builder pattern).
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the bind interface (builder pattern).
    #[must_use]
    pub const fn with_if_addr(mut self, if_addr: Ipv4Addr) -> Self {
        self.if_addr = if_addr;
        self
    }

    /// Sets the multicast group (builder pattern).
    #[must_use]
    pub const fn with_multicast_addr(mut self, addr: Ipv4Addr) -> Self {
        self.multicast_addr = addr;
        self
    }

    /// Sets the multicast TTL (builder pattern).
    #[must_use]
    pub const fn with_multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    /// Sets the outbound multicast interface (builder pattern).
    #[must_use]
    pub const fn with_multicast_if(mut self, if_addr: Ipv4Addr) -> Self {
        self.multicast_if = Some(if_addr);
        self
    }

    /// Disables multicast membership in favor of broadcast (builder pattern).
    #[must_use]
    pub const fn with_broadcast_only(mut self, broadcast_only: bool) -> Self {
        self.broadcast_only = broadcast_only;
        self
    }

    /// Enables packet encryption with a shared secret (builder pattern).
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HeartbeatPayload {
    node: String,
}

enum Event {
    Stop,
    Beat,
    Packet(usize),
}

/// Multicast UDP gossip discovery.
pub struct Gossip {
    config: GossipConfig,
    cipher: Option<PacketCipher>,
}

impl Gossip {
    /// Creates the strategy from its configuration.
    #[must_use]
    pub fn new(config: GossipConfig) -> Self {
        let cipher = config.secret.as_deref().map(PacketCipher::new);
        Self { config, cipher }
    }

    fn bind_socket(&self) -> DiscoveryResult<std::net::UdpSocket> {
        let bind_addr = SocketAddrV4::new(self.config.if_addr, self.config.port);

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly",
        ))]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket
            .bind(&SocketAddr::V4(bind_addr).into())
            .map_err(|source| DiscoveryError::Bind {
                addr: bind_addr.to_string(),
                source,
            })?;

        if self.config.broadcast_only {
            socket.set_broadcast(true)?;
        } else {
            let interface = self.config.multicast_if.unwrap_or(self.config.if_addr);
            socket.join_multicast_v4(&self.config.multicast_addr, &interface)?;
            socket.set_multicast_ttl_v4(self.config.multicast_ttl)?;
            // Loop emissions back so co-located workers see each other.
            socket.set_multicast_loop_v4(true)?;
            if let Some(if_addr) = self.config.multicast_if {
                socket.set_multicast_if_v4(&if_addr)?;
            }
        }

        Ok(socket.into())
    }

    fn encode_heartbeat(&self, node: &NodeName) -> DiscoveryResult<Vec<u8>> {
        let payload = HeartbeatPayload {
            node: node.to_string(),
        };
        let mut packet = HEARTBEAT_PREFIX.to_vec();
        packet.extend_from_slice(&serde_json::to_vec(&payload).map_err(|e| {
            DiscoveryError::Backend {
                backend: "gossip",
                message: format!("failed to encode heartbeat: {e}"),
            }
        })?);

        Ok(match &self.cipher {
            Some(cipher) => cipher.seal(&packet),
            None => packet,
        })
    }

    fn decode_heartbeat(&self, datagram: &[u8]) -> Option<NodeName> {
        let plain: Cow<'_, [u8]> = match &self.cipher {
            Some(cipher) => match cipher.open(datagram) {
                Ok(plain) => Cow::Owned(plain),
                Err(e) => {
                    debug!(error = %e, "Dropping undecryptable gossip packet");
                    return None;
                }
            },
            None => Cow::Borrowed(datagram),
        };

        let payload = plain.strip_prefix(HEARTBEAT_PREFIX)?;
        match serde_json::from_slice::<HeartbeatPayload>(payload) {
            Ok(heartbeat) => match heartbeat.node.parse() {
                Ok(node) => Some(node),
                Err(e) => {
                    debug!(error = %e, "Dropping heartbeat with malformed node name");
                    None
                }
            },
            Err(e) => {
                debug!(error = %e, "Dropping malformed heartbeat payload");
                None
            }
        }
    }
}

/// Random resend delay, uniform in `[1, 5000]` ms.
fn heartbeat_jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(1..=MAX_JITTER_MS))
}

#[async_trait]
impl Strategy for Gossip {
    fn name(&self) -> &'static str {
        "gossip"
    }

    async fn run(&self, ctx: &mut TopologyContext) -> DiscoveryResult<()> {
        let socket = UdpSocket::from_std(self.bind_socket()?)?;
        let dest = SocketAddr::V4(SocketAddrV4::new(
            self.config.multicast_addr,
            self.config.port,
        ));

        info!(topology = %ctx.topology(), group = %dest,
            encrypted = self.cipher.is_some(), "Gossip worker listening");

        let mut buf = vec![0u8; MAX_DATAGRAM];
        // First heartbeat goes out immediately; every later one is jittered.
        let mut next_beat = tokio::time::Instant::now();

        loop {
            let event = tokio::select! {
                _ = ctx.shutdown_signalled() => Event::Stop,
                _ = tokio::time::sleep_until(next_beat) => Event::Beat,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, _from)) => Event::Packet(len),
                    Err(e) => {
                        warn!(topology = %ctx.topology(), error = %e,
                            "Gossip socket receive error");
                        continue;
                    }
                },
            };

            match event {
                Event::Stop => {
                    debug!(topology = %ctx.topology(), "Gossip worker stopping");
                    // The socket is owned by this worker and closes on drop.
                    return Ok(());
                }
                Event::Beat => {
                    let packet = self.encode_heartbeat(ctx.local_node())?;
                    match socket.send_to(&packet, dest).await {
                        Ok(_) => {
                            counter!("peermesh_gossip_heartbeats_sent").increment(1);
                        }
                        Err(e) => {
                            warn!(topology = %ctx.topology(), error = %e,
                                "Failed to send gossip heartbeat");
                        }
                    }
                    next_beat = tokio::time::Instant::now() + heartbeat_jitter();
                }
                Event::Packet(len) => {
                    let Some(peer) = self.decode_heartbeat(&buf[..len]) else {
                        continue;
                    };
                    if &peer == ctx.local_node() || ctx.membership().contains(&peer) {
                        continue;
                    }
                    counter!("peermesh_gossip_heartbeats_received").increment(1);
                    let desired: HashSet<NodeName> = ctx
                        .membership()
                        .iter()
                        .cloned()
                        .chain(std::iter::once(peer))
                        .collect();
                    ctx.reconcile(&desired, true).await;
                }
            }
        }
    }
}
