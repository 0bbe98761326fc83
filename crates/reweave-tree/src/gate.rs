//! Modification gate
//!
//! A per-processor flag controlling whether tree mutators may run. The
//! gate is closed by default and opened in scopes: around the write
//! phase and around classfile parsing. Scopes are counted, so
//! concurrent holders (parallel parses on different classes) restore
//! the closed state correctly no matter which scope ends first.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared permission flag for tree mutation.
///
/// Cloning yields a handle to the same underlying flag. The gate is
/// open while at least one [`GateGuard`] is alive.
#[derive(Clone, Debug, Default)]
pub struct ModificationGate {
    holds: Arc<AtomicUsize>,
}

impl ModificationGate {
    /// Create a new, closed gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether mutation is currently permitted
    pub fn is_open(&self) -> bool {
        self.holds.load(Ordering::SeqCst) > 0
    }

    /// Open the gate for the lifetime of the returned guard
    #[must_use]
    pub fn open_scoped(&self) -> GateGuard {
        self.holds.fetch_add(1, Ordering::SeqCst);
        GateGuard { gate: self.clone() }
    }
}

/// Releases one hold on the gate when dropped, including on unwind
#[derive(Debug)]
pub struct GateGuard {
    gate: ModificationGate,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.holds.fetch_sub(1, Ordering::SeqCst);
    }
}
