//! Readiness slot: single-write, multi-read cell an artifact producer fills.

use pf_core::artifact::Artifact;
use std::sync::{Arc, OnceLock};

/// Create a fresh, empty slot. Each export action needs its own.
pub fn readiness_slot<T>() -> (SlotWriter<T>, SlotReader<T>) {
    let cell = Arc::new(OnceLock::new());
    (
        SlotWriter { cell: cell.clone() },
        SlotReader { cell },
    )
}

/// The producer's end. `fill` consumes it, so a slot is written at most once.
#[derive(Debug)]
pub struct SlotWriter<T = Artifact> {
    cell: Arc<OnceLock<T>>,
}

impl<T> SlotWriter<T> {
    pub fn fill(self, value: T) {
        // The writer is unique, so the cell cannot already be set.
        let _ = self.cell.set(value);
    }
}

/// The poller's end.
#[derive(Debug)]
pub struct SlotReader<T = Artifact> {
    cell: Arc<OnceLock<T>>,
}

impl<T> Clone for SlotReader<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> SlotReader<T> {
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> SlotReader<T> {
    /// Zero-argument getter suitable for [`crate::ReadinessPoller`].
    pub fn getter(&self) -> impl FnMut() -> Option<T> + Send + 'static {
        let reader = self.clone();
        move || reader.get().cloned()
    }
}
