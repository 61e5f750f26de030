//! Task intake. The only agent that sees a freshly admitted task: it
//! validates nothing itself (the API already did), and simply forwards
//! to the Planner under the `detect_intent` message, preserving the
//! bypass fields (`operation`/`params`) unchanged.

use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use super::message::{BusMessage, TaskId};
use super::AgentDeps;

pub async fn run(deps: AgentDeps, mut inbox: Receiver<BusMessage>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            msg = inbox.recv() => {
                match msg {
                    Some(msg) => dispatch(&deps, msg),
                    None => return,
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

fn dispatch(deps: &AgentDeps, msg: BusMessage) {
    match msg {
        BusMessage::NewTask {
            id,
            message,
            mode,
            operation,
            params,
        } => {
            tracing::info!(task_id = %id, mode = ?mode, "inspector: new task");
            deps.bus.send(
                "planner",
                BusMessage::DetectIntent {
                    id,
                    message,
                    mode,
                    operation,
                    params,
                },
            );
        }
        other => {
            tracing::warn!(?other, "inspector: unknown message type");
        }
    }
}
