//! The four long-lived worker agents (Inspector, Planner, Verifier,
//! Analyst) and the typed messages they exchange over the [`crate::bus::Bus`].
//!
//! Each agent owns one inbox and runs a `tokio::select!` loop until the
//! shutdown token fires. A panic inside a single dispatch is contained by
//! `tokio::spawn`'s own unwind boundary — it surfaces as a `JoinError` on
//! the handle, not a process abort — so [`spawn_supervised`] restarts the
//! loop with a fresh inbox subscription rather than losing the whole
//! pipeline to one bad message.

pub mod analyst;
pub mod inspector;
pub mod message;
pub mod planner;
pub mod verifier;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Runs `make_run` repeatedly, resubscribing and restarting the agent
/// loop whenever it exits with a panic, until `shutdown` fires.
pub fn spawn_supervised<F, Fut>(
    name: &'static str,
    shutdown: CancellationToken,
    make_run: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            let handle = tokio::spawn(make_run());
            match handle.await {
                Ok(()) => return,
                Err(join_err) => {
                    tracing::error!(agent = name, error = %join_err, "agent task panicked, restarting");
                    if shutdown.is_cancelled() {
                        return;
                    }
                }
            }
        }
    })
}

/// Shared handles every agent needs: the bus (to send onward), the task
/// registry (to store terminal results and look up cancellation
/// contexts), and the catalog (read-only, shared across the whole
/// process).
#[derive(Clone)]
pub struct AgentDeps {
    pub bus: Arc<crate::bus::Bus>,
    pub registry: Arc<crate::registry::TaskRegistry>,
    pub catalog: Arc<crate::catalog::Catalog>,
}
