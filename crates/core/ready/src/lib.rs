//! Readiness Gate: composable probes over a drain switch and the
//! Snapshot Store, evaluated fresh on every request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contentnode_core_store::Store;

/// A single readiness check. `None` means pass; `Some(reason)` means fail.
pub type Probe = Box<dyn Fn() -> Option<String> + Send + Sync>;

/// Passes only while every probe passes.
pub fn all(probes: Vec<Probe>) -> Probe {
    Box::new(move || {
        for probe in &probes {
            if let Some(reason) = probe() {
                return Some(reason);
            }
        }
        None
    })
}

/// Passes as soon as any probe passes; reports the first probe's failure
/// reason when every probe fails.
pub fn any(probes: Vec<Probe>) -> Probe {
    Box::new(move || {
        let mut first_failure = None;
        for probe in &probes {
            match probe() {
                None => return None,
                Some(reason) => {
                    if first_failure.is_none() {
                        first_failure = Some(reason);
                    }
                }
            }
        }
        first_failure
    })
}

/// A static probe that always passes; used for liveness.
pub fn always_ready() -> Probe {
    Box::new(|| None)
}

/// A flippable switch: readiness fails with `reason` once `close()` has
/// been called. Used to mark the node draining during shutdown.
pub struct DrainGate {
    closed: AtomicBool,
    reason: String,
}

impl DrainGate {
    pub fn new() -> Self {
        Self::with_reason("draining")
    }

    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            closed: AtomicBool::new(false),
            reason: reason.into(),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Builds a `Probe` that reads this gate's current state. Cheap to
    /// clone the `Arc` into multiple composed gates.
    pub fn probe(self: &Arc<Self>) -> Probe {
        let gate = self.clone();
        Box::new(move || {
            if gate.is_closed() {
                Some(gate.reason.clone())
            } else {
                None
            }
        })
    }
}

impl Default for DrainGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a `Probe` that delegates to the Snapshot Store's `ready_err()`.
pub fn snapshot_probe(store: Arc<Store>) -> Probe {
    Box::new(move || store.ready_err())
}
