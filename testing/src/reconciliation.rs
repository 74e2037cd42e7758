//! Reconciliation sink that keeps entries for assertions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};
use studio_core::reconciliation::{ReconciliationEntry, ReconciliationLog, ReconciliationReason};

/// In-memory [`ReconciliationLog`].
#[derive(Clone, Debug, Default)]
pub struct RecordingReconciliation {
    entries: Arc<Mutex<Vec<ReconciliationEntry>>>,
}

impl RecordingReconciliation {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries recorded so far, in order
    #[must_use]
    pub fn entries(&self) -> Vec<ReconciliationEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Reasons of all entries, in order
    #[must_use]
    pub fn reasons(&self) -> Vec<ReconciliationReason> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reason)
            .collect()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl ReconciliationLog for RecordingReconciliation {
    fn record(&self, entry: ReconciliationEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}
