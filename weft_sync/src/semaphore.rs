//! Counting semaphore with a FIFO wait queue.
//!
//! # Blocking discipline
//!
//! A thread that calls [`Semaphore::down`] on an exhausted count enqueues its
//! identity, releases the critical section, and suspends through the
//! scheduler. [`Semaphore::up`] increments the count and wakes exactly the
//! longest-waiting identity. The woken thread re-enters the critical section
//! and re-tests the count before decrementing, so a wakeup delivered without
//! the resource actually being available (a spurious resume, or the unit
//! having been claimed by a faster thread) sends it back to waiting instead
//! of letting it observe a stale decrement.

use std::collections::VecDeque;
use std::sync::Arc;

use weft_core::{CriticalSection, Scheduler, ThreadId};

// =============================================================================
// SemError
// =============================================================================

/// Failure outcomes of semaphore operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemError {
    /// The semaphore has been destroyed; no further operations are accepted.
    Closed,
    /// Destruction was rejected because threads are still blocked on the
    /// semaphore.
    WaitersPending,
}

impl std::fmt::Display for SemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemError::Closed => write!(f, "semaphore is destroyed"),
            SemError::WaitersPending => {
                write!(f, "semaphore has blocked waiters and cannot be destroyed")
            }
        }
    }
}

impl std::error::Error for SemError {}

// =============================================================================
// Semaphore
// =============================================================================

/// State guarded by the semaphore's critical section.
struct SemState {
    /// Units of the resource currently available.
    count: usize,
    /// Blocked thread identities in arrival order.
    waiters: VecDeque<ThreadId>,
    /// Set by a successful destroy; every later operation fails.
    closed: bool,
}

/// Counting semaphore released in strict FIFO order.
pub struct Semaphore {
    sched: Arc<dyn Scheduler>,
    critical: CriticalSection<SemState>,
}

impl Semaphore {
    /// Create a semaphore holding `initial` units of the resource.
    pub fn new(initial: usize, sched: Arc<dyn Scheduler>) -> Self {
        Semaphore {
            sched,
            critical: CriticalSection::new(SemState {
                count: initial,
                waiters: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Take one unit of the resource, blocking until one is available.
    pub fn down(&self) -> Result<(), SemError> {
        let me = self.sched.current();
        let mut cs = self.critical.enter();
        if cs.closed {
            return Err(SemError::Closed);
        }
        while cs.count == 0 {
            // A spurious resume lands back here with the identity still
            // queued; the membership check keeps it queued exactly once.
            if !cs.waiters.contains(&me) {
                cs.waiters.push_back(me);
            }
            drop(cs);
            self.sched.block(me);
            cs = self.critical.enter();
            if cs.closed {
                return Err(SemError::Closed);
            }
        }
        cs.count -= 1;
        Ok(())
    }

    /// Return one unit of the resource, waking the longest-waiting thread.
    pub fn up(&self) -> Result<(), SemError> {
        let mut cs = self.critical.enter();
        if cs.closed {
            return Err(SemError::Closed);
        }
        cs.count += 1;
        if let Some(next) = cs.waiters.pop_front() {
            self.sched.unblock(next);
        }
        Ok(())
    }

    /// Take one unit and hold it for the lifetime of the returned permit.
    ///
    /// The unit is returned with [`Semaphore::up`] when the permit drops.
    pub fn acquire(&self) -> Result<SemPermit<'_>, SemError> {
        self.down()?;
        Ok(SemPermit { sem: self })
    }

    /// Destroy the semaphore.
    ///
    /// Rejected with [`SemError::WaitersPending`] while any thread is blocked
    /// in [`Semaphore::down`]; a suspended thread must never resume into
    /// released state. After a successful destroy every operation fails with
    /// [`SemError::Closed`] and the memory is freed when the last handle
    /// drops.
    pub fn destroy(&self) -> Result<(), SemError> {
        let mut cs = self.critical.enter();
        if cs.closed {
            return Err(SemError::Closed);
        }
        if !cs.waiters.is_empty() {
            return Err(SemError::WaitersPending);
        }
        cs.closed = true;
        cs.count = 0;
        Ok(())
    }

    /// Units currently available.
    pub fn available(&self) -> usize {
        self.critical.enter().count
    }

    /// Number of threads currently queued on the semaphore.
    pub fn waiting(&self) -> usize {
        self.critical.enter().waiters.len()
    }
}

// =============================================================================
// SemPermit
// =============================================================================

/// One held unit of a semaphore's resource.
///
/// Dropping the permit returns the unit.
pub struct SemPermit<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemPermit<'_> {
    fn drop(&mut self) {
        let _ = self.sem.up();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::OsScheduler;

    fn semaphore(initial: usize) -> Semaphore {
        Semaphore::new(initial, Arc::new(OsScheduler::new()))
    }

    #[test]
    fn test_new_holds_initial_count() {
        let sem = semaphore(3);
        assert_eq!(sem.available(), 3);
        assert_eq!(sem.waiting(), 0);
    }

    #[test]
    fn test_down_decrements_without_blocking() {
        let sem = semaphore(2);
        sem.down().unwrap();
        assert_eq!(sem.available(), 1);
        sem.down().unwrap();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_up_increments() {
        let sem = semaphore(0);
        sem.up().unwrap();
        sem.up().unwrap();
        assert_eq!(sem.available(), 2);
    }

    #[test]
    fn test_up_then_down_balances() {
        let sem = semaphore(0);
        sem.up().unwrap();
        sem.down().unwrap();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_destroy_empty_succeeds() {
        let sem = semaphore(1);
        sem.destroy().unwrap();
    }

    #[test]
    fn test_operations_after_destroy_fail() {
        let sem = semaphore(1);
        sem.destroy().unwrap();
        assert_eq!(sem.down(), Err(SemError::Closed));
        assert_eq!(sem.up(), Err(SemError::Closed));
        assert_eq!(sem.destroy(), Err(SemError::Closed));
    }

    #[test]
    fn test_permit_returns_unit_on_drop() {
        let sem = semaphore(1);
        {
            let _permit = sem.acquire().unwrap();
            assert_eq!(sem.available(), 0);
        }
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(SemError::Closed.to_string(), "semaphore is destroyed");
        assert!(SemError::WaitersPending.to_string().contains("blocked"));
    }
}
