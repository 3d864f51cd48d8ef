//! Host capacity queries.

use std::thread;

/// Assumed when the host does not report its parallelism.
pub const FALLBACK_WORKER_SLOTS: usize = 8;

/// Number of worker slots usable on this host.
pub fn available_worker_slots() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKER_SLOTS)
}
