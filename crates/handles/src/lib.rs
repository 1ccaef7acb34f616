#![deny(unsafe_code)]

//! Server-side registry mapping opaque client-visible file handles to live
//! `std::fs::File` objects.
//!
//! Grounded in the handle/registry invariants of the filesystem protocol:
//! handles are non-zero `u64`s, monotonically increasing from 1, never
//! reused within the server process's lifetime, and inserted/removed only by
//! `OpenFile` and `CloseFile` respectively.

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Concurrent map from handle id to open file, plus the monotonic allocator.
///
/// Insert/remove is single-writer-per-key in practice (one `OpenFile` call
/// inserts a given id, one `CloseFile` call removes it), so a concurrent map
/// with per-key atomic operations is sufficient; no additional locking is
/// required around individual entries.
#[derive(Default)]
pub struct Registry {
    files: DashMap<u64, File>,
    next_handle: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            files: DashMap::new(),
            // Handle 0 is reserved so callers can use it as an "absent handle"
            // sentinel without colliding with a live one.
            next_handle: AtomicU64::new(1),
        }
    }

    /// Allocate the next handle id and register `file` under it. Returns the
    /// new handle.
    pub fn insert(&self, file: File) -> u64 {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.files.insert(handle, file);
        handle
    }

    /// Remove and drop the file registered under `handle`, closing it.
    /// Returns `true` if an entry existed.
    pub fn close(&self, handle: u64) -> bool {
        self.files.remove(&handle).is_some()
    }

    /// Run `f` against the file registered under `handle`, if any.
    pub fn with<R>(&self, handle: u64, f: impl FnOnce(&File) -> R) -> Option<R> {
        self.files.get(&handle).map(|entry| f(&entry))
    }

    /// Snapshot of the allocator's current value. A handle greater than this
    /// value is guaranteed never to have been allocated yet, which is the
    /// basis of the handle-plausibility check used for `GetFileAttributes`
    /// and `Truncate` (see [`Self::plausible`]).
    pub fn next_handle_snapshot(&self) -> u64 {
        self.next_handle.load(Ordering::SeqCst)
    }

    /// Decide whether `handle` should be treated as a handle lookup rather
    /// than falling back to a path-based syscall.
    ///
    /// A value greater than the current allocator snapshot cannot possibly
    /// be live and is routed to the path branch; a value within range may or
    /// may not be live and the registry lookup decides. This is racy in the
    /// sense that the allocator may advance between the snapshot and the
    /// actual lookup, but that only ever widens the "plausible" range — it
    /// can never cause a genuinely live handle to be misclassified as
    /// implausible.
    pub fn plausible(&self, handle: u64) -> bool {
        handle != 0 && handle <= self.next_handle_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file() -> File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(b"hello").unwrap();
        f
    }

    #[test]
    fn handles_are_nonzero_and_monotonic() {
        let reg = Registry::new();
        let h1 = reg.insert(scratch_file());
        let h2 = reg.insert(scratch_file());
        assert_ne!(h1, 0);
        assert_ne!(h2, 0);
        assert!(h1 < h2);
    }

    #[test]
    fn close_removes_entry_and_is_idempotent_false_on_second_call() {
        let reg = Registry::new();
        let h = reg.insert(scratch_file());
        assert!(reg.with(h, |_| ()).is_some());
        assert!(reg.close(h));
        assert!(reg.with(h, |_| ()).is_none());
        assert!(!reg.close(h));
    }

    #[test]
    fn plausibility_rejects_handles_beyond_the_counter() {
        let reg = Registry::new();
        let h = reg.insert(scratch_file());
        assert!(reg.plausible(h));
        assert!(!reg.plausible(h + 1_000));
        assert!(!reg.plausible(u64::MAX));
        assert!(!reg.plausible(0));
    }

    #[test]
    fn closed_handle_may_still_be_numerically_plausible() {
        // A value in-range may or may not be live; the registry lookup,
        // not `plausible`, is what decides liveness.
        let reg = Registry::new();
        let h = reg.insert(scratch_file());
        reg.close(h);
        assert!(reg.plausible(h));
        assert!(reg.with(h, |_| ()).is_none());
    }
}
