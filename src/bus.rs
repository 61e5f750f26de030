//! Named-inbox message router.
//!
//! Each agent owns one inbox, registered under a stable name
//! (`"inspector"`, `"planner"`, `"verifier"`, `"analyst"`). Sending is
//! non-blocking: a full or unregistered inbox drops the message rather
//! than stalling the sender, so one slow or crashed agent cannot wedge
//! the rest of the pipeline. Re-subscribing under a name already in use
//! replaces the previous inbox (last subscriber wins) — there is
//! exactly one live receiver per name at any time.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::agents::message::BusMessage;
use crate::metrics::Metrics;

/// Inboxes are bounded: a backlog beyond this size means the consumer
/// has fallen behind, and the bus starts shedding load rather than
/// buffering indefinitely.
pub const INBOX_CAPACITY: usize = 16;

pub struct Bus {
    subs: Mutex<HashMap<String, mpsc::Sender<BusMessage>>>,
    metrics: Metrics,
}

impl Bus {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            subs: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Registers a new inbox under `name`, returning the receiving end.
    /// A previous subscription under the same name is dropped.
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.subs
            .lock()
            .expect("bus subscriber map poisoned")
            .insert(name.into(), tx);
        rx
    }

    /// Attempts to deliver `msg` to `target`'s inbox without blocking.
    /// Returns `true` if the message was enqueued, `false` if it was
    /// dropped (target unknown, or its inbox is full/closed).
    pub fn send(&self, target: &str, msg: BusMessage) -> bool {
        let sender = self
            .subs
            .lock()
            .expect("bus subscriber map poisoned")
            .get(target)
            .cloned();
        let delivered = match sender {
            Some(tx) => tx.try_send(msg).is_ok(),
            None => false,
        };
        self.metrics
            .bus_messages(target, if delivered { "sent" } else { "dropped" });
        delivered
    }
}
