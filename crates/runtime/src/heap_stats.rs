//! Process-global heap statistics.
//!
//! Counters are plain atomics updated on every allocation and free, read
//! by tests (refcount-balance checks) and the at-exit report. Updates are
//! single atomic adds so the allocation fast path stays fast.

use std::sync::atomic::{AtomicU64, Ordering};

static TOTAL_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static TOTAL_FREES: AtomicU64 = AtomicU64::new(0);
static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);

pub(crate) fn record_alloc(bytes: usize) {
    TOTAL_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    LIVE_BYTES.fetch_add(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_free(bytes: usize) {
    TOTAL_FREES.fetch_add(1, Ordering::Relaxed);
    LIVE_BYTES.fetch_sub(bytes as u64, Ordering::Relaxed);
}

pub(crate) fn record_resize(old_bytes: usize, new_bytes: usize) {
    if new_bytes >= old_bytes {
        LIVE_BYTES.fetch_add((new_bytes - old_bytes) as u64, Ordering::Relaxed);
    } else {
        LIVE_BYTES.fetch_sub((old_bytes - new_bytes) as u64, Ordering::Relaxed);
    }
}

/// Objects allocated over the process lifetime.
pub fn total_allocations() -> u64 {
    TOTAL_ALLOCATIONS.load(Ordering::Relaxed)
}

/// Objects freed over the process lifetime.
pub fn total_frees() -> u64 {
    TOTAL_FREES.load(Ordering::Relaxed)
}

/// Heap objects currently alive.
pub fn live_objects() -> u64 {
    total_allocations().saturating_sub(total_frees())
}

/// Bytes currently held by live heap objects (headers included).
pub fn live_bytes() -> u64 {
    LIVE_BYTES.load(Ordering::Relaxed)
}
