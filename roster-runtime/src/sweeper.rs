//! Periodic membership sweep
//!
//! The engine never evicts on its own; something has to call
//! [`Membership::sweep`] with a non-decreasing clock. [`Sweeper`] is that
//! something: it sleeps on a [`Runtime`] and sweeps every interval until told
//! to stop.

use std::sync::Arc;
use std::time::Duration;

use rand_core::RngCore;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use roster_core::membership::{Membership, SweepReport};

use crate::Runtime;

/// Drives [`Membership::sweep`] on a fixed cadence
pub struct Sweeper<RT, R> {
    runtime: Arc<RT>,
    membership: Arc<Membership<R>>,
    interval: Duration,
}

impl<RT: Runtime, R: RngCore> Sweeper<RT, R> {
    /// Sweep `membership` every `interval` using `runtime`'s clock
    pub fn new(runtime: Arc<RT>, membership: Arc<Membership<R>>, interval: Duration) -> Self {
        Self {
            runtime,
            membership,
            interval,
        }
    }

    /// Sweep using the engine's configured interval
    pub fn from_config(runtime: Arc<RT>, membership: Arc<Membership<R>>) -> Self {
        let interval = membership.config().sweep_interval();
        Self::new(runtime, membership, interval)
    }

    /// Time between sweeps
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep at the runtime's current time
    pub fn tick(&self) -> SweepReport {
        self.membership.sweep(self.runtime.now())
    }

    /// Sweep every interval until `shutdown` flips to `true` or its sender
    /// is dropped. Returns the number of sweeps performed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(interval_ms = self.interval.as_millis() as u64, "membership sweeper started");
        let mut sweeps = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.runtime.sleep(self.interval) => {
                    let report = self.tick();
                    sweeps += 1;
                    if !report.expired.is_empty() || report.operations_evicted > 0 {
                        debug!(
                            expired = report.expired.len(),
                            operations_evicted = report.operations_evicted,
                            "sweep evicted records"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(sweeps, "membership sweeper stopped");
        sweeps
    }
}

impl<RT, R> Sweeper<RT, R>
where
    RT: Runtime,
    R: RngCore + Send + 'static,
{
    /// Spawn the sweep loop on the sweeper's own runtime
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, receiver) = watch::channel(false);
        let (done, finished) = oneshot::channel();
        let runtime = Arc::clone(&self.runtime);
        runtime.spawn(async move {
            let _ = done.send(self.run(receiver).await);
        });
        SweeperHandle { shutdown, finished }
    }
}

/// Handle to a spawned [`Sweeper`]
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    finished: oneshot::Receiver<u64>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it, returning its sweep count.
    ///
    /// Returns 0 if the task never ran.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        self.finished.await.unwrap_or(0)
    }
}
