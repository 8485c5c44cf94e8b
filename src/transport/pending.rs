//! Correlation of in-flight requests with their responses.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::{Error, Result};

struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

/// The correlation table: request id -> in-flight completion handle.
///
/// Exactly one of {matching response, timeout, drain} settles a given call:
/// every settlement path removes the entry from the map under the same lock,
/// so later attempts find nothing and become no-ops. A response for an
/// already-settled id is expected under normal operation (it raced a timeout
/// or a disconnect) and is silently ignored.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<HashMap<u64, PendingCall>>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight request and return its completion handle.
    ///
    /// The method name is kept for diagnostics (timeout errors carry it).
    pub fn register(&self, id: u64, method: impl Into<String>) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        let call = PendingCall {
            method: method.into(),
            tx,
        };
        let previous = self
            .inner
            .lock()
            .expect("pending table lock poisoned")
            .insert(id, call);
        debug_assert!(previous.is_none(), "request id {id} already in flight");
        rx
    }

    /// Settle the call registered under `id`, if it is still in flight.
    ///
    /// Returns `false` when no such call exists (late or duplicate
    /// response); the result is dropped in that case.
    pub fn settle(&self, id: u64, result: Result<Value>) -> bool {
        let call = self
            .inner
            .lock()
            .expect("pending table lock poisoned")
            .remove(&id);
        match call {
            Some(call) => {
                // The caller may have stopped waiting; a dead receiver is fine.
                let _ = call.tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id` without settling it.
    ///
    /// Used by the timeout path: the caller constructs its own timeout error
    /// and this guarantees a response arriving later finds nothing to settle.
    /// Returns the originating method name if the entry was still present.
    pub fn remove(&self, id: u64) -> Option<String> {
        self.inner
            .lock()
            .expect("pending table lock poisoned")
            .remove(&id)
            .map(|call| call.method)
    }

    /// Fail every remaining call and leave the table empty.
    ///
    /// `make_err` is invoked once per entry with the originating method name,
    /// so no caller hangs forever after a disconnect or process exit.
    pub fn drain(&self, mut make_err: impl FnMut(&str) -> Error) {
        let drained: Vec<PendingCall> = {
            let mut table = self.inner.lock().expect("pending table lock poisoned");
            table.drain().map(|(_, call)| call).collect()
        };
        for call in drained {
            let err = make_err(&call.method);
            let _ = call.tx.send(Err(err));
        }
    }

    /// Number of calls currently in flight.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("pending table lock poisoned").len()
    }

    /// Whether no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
