//! Request/response correlation for long-lived transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::BridgeError;
use crate::protocol::{Inbound, McpResponse};

/// Receives decoded frames from a transport's receive loop.
pub trait MessageHandler: Send + Sync {
    /// One inbound frame (a JSON text).
    fn handle_message(&self, text: &str);

    /// The transport is gone. Called at least once per transport.
    fn handle_closed(&self);
}

type ResultSender = oneshot::Sender<Result<McpResponse, BridgeError>>;

/// Pending request waiting for response.
struct PendingRequest {
    method: String,
    tx: ResultSender,
}

/// Single-resolution slot returned by [`RequestCorrelator::register`].
pub struct ResultSlot {
    id: String,
    method: String,
    rx: oneshot::Receiver<Result<McpResponse, BridgeError>>,
}

impl ResultSlot {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Maps outstanding request ids to result slots.
///
/// Ids come from a per-connection counter that starts at 0 and is
/// incremented before use, so the first id handed out is `"1"`.
pub struct RequestCorrelator {
    server_id: String,
    counter: AtomicU64,
    pending: Mutex<HashMap<String, PendingRequest>>,
    closed: AtomicBool,
}

impl RequestCorrelator {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn next_id(&self) -> String {
        (self.counter.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Reserve a slot for `id`. Fails once the transport has closed.
    pub fn register(&self, id: &str, method: &str) -> Result<ResultSlot, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::Cancelled(format!(
                "{} on {}: transport closed",
                method, self.server_id
            )));
        }
        pending.insert(
            id.to_string(),
            PendingRequest {
                method: method.to_string(),
                tx,
            },
        );
        Ok(ResultSlot {
            id: id.to_string(),
            method: method.to_string(),
            rx,
        })
    }

    /// Fulfil the slot matching the response id.
    ///
    /// Returns `false` for responses nobody is waiting on.
    pub fn resolve(&self, response: McpResponse) -> bool {
        let Some(key) = response.id_key() else {
            debug!(server_id = %self.server_id, "Dropping response without id");
            return false;
        };

        let entry = self.pending.lock().remove(&key);
        match entry {
            Some(request) => {
                trace!(server_id = %self.server_id, id = %key, method = %request.method, "Resolved request");
                let _ = request.tx.send(Ok(response));
                true
            }
            None => {
                debug!(server_id = %self.server_id, id = %key, "Unmatched response");
                false
            }
        }
    }

    /// Wait for the slot. On timeout the id is removed from the pending map
    /// before the error is returned.
    pub async fn await_result(
        &self,
        slot: ResultSlot,
        timeout: Duration,
    ) -> Result<McpResponse, BridgeError> {
        let ResultSlot { id, method, rx } = slot;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::Cancelled(format!("{} (id {})", method, id))),
            Err(_) => {
                self.pending.lock().remove(&id);
                warn!(server_id = %self.server_id, id = %id, method = %method, "Request timed out");
                Err(BridgeError::Timeout(format!(
                    "{} (id {}) after {:?}",
                    method, id, timeout
                )))
            }
        }
    }

    /// Drop a slot whose request never made it onto the wire.
    pub fn forget(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    /// Resolve every pending slot with a cancellation error.
    pub fn cancel_all(&self, reason: &str) {
        let drained: Vec<(String, PendingRequest)> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!(server_id = %self.server_id, count = drained.len(), reason, "Cancelling pending requests");
        }
        for (id, request) in drained {
            let _ = request.tx.send(Err(BridgeError::Cancelled(format!(
                "{} (id {}): {}",
                request.method, id, reason
            ))));
        }
    }

    /// Refuse new registrations and cancel everything outstanding.
    pub fn close(&self, reason: &str) {
        {
            let _pending = self.pending.lock();
            self.closed.store(true, Ordering::SeqCst);
        }
        self.cancel_all(reason);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }
}

impl MessageHandler for RequestCorrelator {
    fn handle_message(&self, text: &str) {
        match Inbound::parse(text) {
            Ok(Inbound::Response(response)) => {
                self.resolve(response);
            }
            Ok(Inbound::Notification { method, .. }) => {
                debug!(server_id = %self.server_id, method = %method, "Unsolicited notification");
            }
            Ok(Inbound::Request { id, method, .. }) => {
                debug!(server_id = %self.server_id, id = %id, method = %method, "Ignoring server request");
            }
            Err(e) => {
                warn!(server_id = %self.server_id, error = %e, "Failed to parse inbound message");
            }
        }
    }

    fn handle_closed(&self) {
        self.close("transport closed");
    }
}

#[cfg(test)]
#[path = "correlator_tests.rs"]
mod tests;
