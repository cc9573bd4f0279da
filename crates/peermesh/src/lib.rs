//! Peermesh - automatic peer discovery and cluster membership maintenance.
//!
//! Given a set of named topologies, each bound to a discovery strategy, the
//! library continuously reconciles the set of peers the local node should be
//! connected to against the set it is currently connected to, invoking
//! caller-supplied connect/disconnect callbacks to drive convergence. The
//! transport behind those callbacks is entirely the caller's business; this
//! is a membership-discovery layer, not a messaging layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TopologySupervisor                         │
//! │        one worker task per topology, one-for-one restart     │
//! └──────┬──────────────┬──────────────┬────────────────────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//!  ┌──────────┐   ┌──────────┐   ┌──────────┐
//!  │  Worker  │   │  Worker  │   │  Worker  │     one Strategy each:
//!  │ (gossip) │   │  (dns)   │   │  (k8s)   │     Static │ Local │ HostsFile
//!  └────┬─────┘   └────┬─────┘   └────┬─────┘     Gossip │ Dns │ DnsSrv
//!       │              │              │           Kubernetes │ Rancher │ Nomad
//!       └──────────────┴──────┬───────┘
//!                             ▼
//!              ┌──────────────────────────────┐
//!              │          Reconciler           │
//!              │  desired vs connected diff,   │
//!              │  connect/disconnect callbacks │
//!              └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use peermesh::{
//!     Callbacks, ConnectOutcome, DisconnectOutcome, NodeName,
//!     SupervisorOptions, TopologySpec, TopologySupervisor,
//! };
//! use peermesh::strategy::{Gossip, GossipConfig};
//!
//! let callbacks = Callbacks::new(
//!     |peer| async move { my_transport::connect(&peer).await },
//!     |peer| async move { my_transport::disconnect(&peer).await },
//!     || async { my_transport::connected_peers().await },
//! );
//!
//! let specs = vec![
//!     TopologySpec::new("lan", Gossip::new(GossipConfig::new().with_secret("s3cr3t"))),
//! ];
//! let options = SupervisorOptions::new(NodeName::new("app", "10.0.0.5"))
//!     .with_default_callbacks(callbacks);
//!
//! let supervisor = TopologySupervisor::start(specs, options)?;
//! // ...
//! supervisor.stop().await;
//! ```

#![warn(missing_docs)]

pub mod callbacks;
pub mod crypto;
pub mod epmd;
pub mod error;
pub mod node;
pub mod reconcile;
pub mod resolve;
pub mod strategy;
pub mod supervisor;
pub mod topology;

pub use callbacks::{Callbacks, ConnectOutcome, DisconnectOutcome};
pub use error::{DiscoveryError, DiscoveryResult};
pub use node::NodeName;
pub use reconcile::reconcile;
pub use strategy::Strategy;
pub use supervisor::TopologySupervisor;
pub use topology::{SupervisorOptions, TopologyContext, TopologySpec};
