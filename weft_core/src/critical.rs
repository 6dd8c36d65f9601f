//! Critical sections.
//!
//! Every state transition in the primitives above this crate happens inside
//! a critical section: a mutually-exclusive region entered with
//! [`CriticalSection::enter`] and exited when the returned guard drops. The
//! guard doubles as the only access path to the protected state, so state
//! cannot be touched outside the region.
//!
//! The region is non-reentrant: entering it twice from the same thread
//! deadlocks. Operations that must suspend (a semaphore `down` on an
//! exhausted count) drop the guard before suspending and re-enter on resume,
//! never holding the region across an indefinite wait.

use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

/// Mutual-exclusion region around a piece of state.
pub struct CriticalSection<T> {
    state: Mutex<T>,
}

impl<T> CriticalSection<T> {
    /// Wrap `state` in a critical section.
    pub const fn new(state: T) -> Self {
        CriticalSection {
            state: Mutex::new(state),
        }
    }

    /// Enter the critical section.
    ///
    /// Blocks until the region is free. Must not be called while the calling
    /// thread already holds a guard for the same region.
    #[inline]
    pub fn enter(&self) -> CriticalGuard<'_, T> {
        CriticalGuard {
            inner: self.state.lock(),
        }
    }
}

/// Exclusive access to the state of a [`CriticalSection`].
///
/// Dropping the guard exits the region.
pub struct CriticalGuard<'a, T> {
    inner: MutexGuard<'a, T>,
}

impl<T> Deref for CriticalGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for CriticalGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_grants_access() {
        let cs = CriticalSection::new(41);
        {
            let mut guard = cs.enter();
            *guard += 1;
        }
        assert_eq!(*cs.enter(), 42);
    }

    #[test]
    fn test_reenter_after_exit() {
        let cs = CriticalSection::new(());
        drop(cs.enter());
        drop(cs.enter());
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let cs = Arc::new(CriticalSection::new(0u64));
        let mut workers = Vec::new();
        for _ in 0..8 {
            let cs = Arc::clone(&cs);
            workers.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *cs.enter() += 1;
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*cs.enter(), 8000);
    }
}
