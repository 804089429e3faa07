//! Progress counters for the active refresh run.
//!
//! Both counters live in one [`Progress`] value behind a single mutex so that
//! readers always see a consistent `current`/`total` pair.

use std::sync::Mutex;

/// Counter value used while a run is in its non-enumerable cleanup phase
pub const INDETERMINATE: i64 = -1;

/// Snapshot of the run's progress counters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Outcomes applied so far
    pub current: i64,
    /// Sources in the run
    pub total: i64,
}

impl Progress {
    /// Whether the counters carry the indeterminate sentinel
    pub fn is_indeterminate(&self) -> bool {
        self.total == INDETERMINATE
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            current: INDETERMINATE,
            total: INDETERMINATE,
        }
    }
}

/// Current/total counters for the active run
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: Mutex<Progress>,
}

impl ProgressTracker {
    /// Create a tracker in the indeterminate state
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting a new run of `total` sources
    pub fn reset(&self, total: usize) {
        let mut progress = self.lock();
        progress.current = 0;
        progress.total = total as i64;
    }

    /// Record one applied outcome and return the updated counters
    pub fn increment(&self) -> Progress {
        let mut progress = self.lock();
        if !progress.is_indeterminate() {
            progress.current += 1;
        }
        *progress
    }

    /// Switch both counters to [`INDETERMINATE`]
    pub fn set_indeterminate(&self) -> Progress {
        let mut progress = self.lock();
        *progress = Progress::default();
        *progress
    }

    /// Read both counters
    pub fn snapshot(&self) -> Progress {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Progress> {
        // Counters are plain integers; a poisoned lock still holds valid data
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
