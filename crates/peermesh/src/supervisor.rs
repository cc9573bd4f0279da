//! Topology supervisor.
//!
//! Owns one worker task per configured topology. Workers are independent:
//! a crash restarts only the crashed worker (with a bounded backoff), and a
//! strategy that finishes its one-shot work is simply not restarted. Stopping
//! the supervisor signals every worker and waits until each has released its
//! owned resources.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::strategy::Strategy;
use crate::topology::{SupervisorOptions, TopologyContext, TopologySpec};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

struct WorkerHandle {
    name: String,
    stop: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Supervisor for a set of named topologies.
///
/// # Lifecycle
///
/// 1. Build one [`TopologySpec`] per topology
/// 2. Call [`TopologySupervisor::start`] — validation failures surface here,
///    before any worker runs
/// 3. Call [`TopologySupervisor::stop`] during graceful shutdown
pub struct TopologySupervisor {
    workers: Vec<WorkerHandle>,
}

impl TopologySupervisor {
    /// Validates the configuration and launches one worker per topology.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Config`] when two topologies share a name or
    /// when a topology has neither its own callbacks nor a supervisor-wide
    /// default. Nothing is spawned if validation fails.
    pub fn start(
        specs: Vec<TopologySpec>,
        options: SupervisorOptions,
    ) -> DiscoveryResult<Self> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.clone()) {
                return Err(DiscoveryError::Config(format!(
                    "duplicate topology name '{}'",
                    spec.name
                )));
            }
            let callbacks = spec
                .callbacks
                .or_else(|| options.default_callbacks.clone())
                .ok_or_else(|| {
                    DiscoveryError::Config(format!(
                        "topology '{}' has no callbacks and no supervisor default",
                        spec.name
                    ))
                })?;
            resolved.push((spec.name, spec.strategy, callbacks));
        }

        let mut workers = Vec::with_capacity(resolved.len());
        for (name, strategy, callbacks) in resolved {
            let (ctx, stop) =
                TopologyContext::new(name.clone(), options.local_node.clone(), callbacks);
            let task = tokio::spawn(run_worker(strategy, ctx));
            workers.push(WorkerHandle { name, stop, task });
        }

        Ok(Self { workers })
    }

    /// The names of the supervised topologies.
    #[must_use]
    pub fn topologies(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.name.as_str()).collect()
    }

    /// Signals every worker to stop and waits for each to finish, so owned
    /// sockets and timers are released before this returns.
    pub async fn stop(self) {
        for worker in &self.workers {
            let _ = worker.stop.send(()).await;
        }
        for worker in self.workers {
            if let Err(e) = worker.task.await {
                if e.is_panic() {
                    error!(topology = %worker.name, "Topology worker panicked during shutdown");
                }
            }
        }
    }
}

/// Runs one strategy to completion, restarting it on error (one-for-one).
async fn run_worker(strategy: Box<dyn Strategy>, mut ctx: TopologyContext) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        info!(topology = %ctx.topology(), strategy = strategy.name(),
            "Starting topology worker");
        match strategy.run(&mut ctx).await {
            Ok(()) => {
                debug!(topology = %ctx.topology(), "Topology worker finished");
                return;
            }
            Err(e) => {
                error!(topology = %ctx.topology(), strategy = strategy.name(), error = %e,
                    "Topology worker crashed, restarting");
                // Worker-owned state does not survive a crash.
                ctx.reset();
                tokio::select! {
                    _ = ctx.shutdown_signalled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}
