//! Scheduler capability.
//!
//! The primitives in `weft_sync` and `weft_tps` never suspend or resume a
//! thread themselves; they ask the surrounding thread library to do it
//! through the [`Scheduler`] trait. Inside a user-level thread library this
//! is backed by the real scheduler's block/unblock entry points. For hosted
//! use and for the test suites, [`OsScheduler`] maps the capability onto
//! `std::thread` park/unpark.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, Thread};

use dashmap::DashMap;

use crate::ident::ThreadId;

/// Suspend/resume capability of the surrounding thread library.
///
/// # Contract
///
/// - `block` may return spuriously; callers re-validate their wait predicate
///   after it returns.
/// - A wakeup is never lost: if `unblock(t)` is delivered before `t` reaches
///   `block`, the next `block` on `t` returns immediately.
pub trait Scheduler: Send + Sync {
    /// Identity of the calling thread.
    fn current(&self) -> ThreadId;

    /// Suspend the calling thread until a wakeup is delivered.
    ///
    /// `current` must be the identity returned by [`Scheduler::current`] on
    /// this same thread.
    fn block(&self, current: ThreadId);

    /// Make `target` runnable again.
    ///
    /// Unknown identities are ignored; the wakeup of a thread that has not
    /// yet blocked is retained per the contract above.
    fn unblock(&self, target: ThreadId);
}

// =============================================================================
// OsScheduler
// =============================================================================

/// Process-wide identity counter shared by all [`OsScheduler`] instances.
///
/// A thread keeps one identity for its whole lifetime regardless of how many
/// scheduler instances observe it.
static NEXT_IDENT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static SELF_IDENT: u64 = NEXT_IDENT.fetch_add(1, Ordering::Relaxed);
}

/// Hosted scheduler over `std::thread`.
///
/// Wakeups ride on the park token, which gives exactly the never-lost
/// semantics the [`Scheduler`] contract requires: `unpark` before `park`
/// makes the next `park` return immediately.
pub struct OsScheduler {
    /// Identity to thread-handle registry, populated lazily the first time a
    /// thread identifies itself through this instance.
    threads: DashMap<ThreadId, Thread>,
}

impl OsScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        OsScheduler {
            threads: DashMap::new(),
        }
    }
}

impl Default for OsScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for OsScheduler {
    fn current(&self) -> ThreadId {
        let id = ThreadId::from_raw(SELF_IDENT.with(|ident| *ident));
        // Register the handle so unblock() can find this thread later.
        self.threads
            .entry(id)
            .or_insert_with(thread::current);
        id
    }

    fn block(&self, _current: ThreadId) {
        thread::park();
    }

    fn unblock(&self, target: ThreadId) {
        if let Some(handle) = self.threads.get(&target) {
            handle.unpark();
        }
    }
}
