//! Single-flight gate for coordinator invocations.
//!
//! Two overlapping invocations could both read an idle ingestion service
//! and both start a job, so the dispatcher holds a [`FlightPermit`] for the
//! whole of every invocation. The cap is fixed at one; there is no way to
//! construct a gate that admits more.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Admits at most one holder at a time.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct SingleFlightGate {
    busy: Arc<AtomicBool>,
}

impl SingleFlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the permit, or `None` if another holder has it.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightPermit {
                busy: self.busy.clone(),
            })
    }

    /// Whether the permit is currently held.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Proof of exclusive access; the gate reopens when this is dropped,
/// including during a panic unwind.
#[derive(Debug)]
pub struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}
