//! Segment directory and storage operations.
//!
//! [`Tps`] owns the process's segment directory: a keyed map from thread
//! identity to that thread's single storage segment. All operations identify
//! the caller through the scheduler, validate, then mutate the directory and
//! the segment's page inside the critical section — page protection is
//! process-wide state, so even plain reads serialize through it.
//!
//! # Sharing and copy-on-write
//!
//! A segment holds its page through `Arc`, so the page's sharing count is
//! the number of segments referencing it and the mapping is released exactly
//! when the last segment detaches. The first write to a shared page
//! privatizes it: a fresh page is mapped, the contents are copied, and the
//! writer's segment swaps its handle to the private page. The swap is what
//! detaches the writer, so the shared record's count drops by precisely the
//! one departing reference and the invariant "total sharing count across all
//! pages equals the number of live segments" holds through every operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};

use weft_core::{CriticalSection, Scheduler, ThreadId};

use crate::handler;
use crate::page::{PAGE_SIZE, Page, PageError};
use crate::stats::TpsStats;

// =============================================================================
// TpsError
// =============================================================================

/// Failure outcomes of storage operations.
#[derive(Debug, Clone)]
pub enum TpsError {
    /// A storage context already exists in this process.
    AlreadyInitialized,
    /// The calling thread has no segment.
    NoSegment,
    /// The calling thread already has a segment.
    SegmentExists,
    /// The clone target has no segment.
    TargetHasNoSegment,
    /// The requested range does not fit the page.
    OutOfBounds { offset: usize, len: usize },
    /// Mapping a page failed.
    Allocation(String),
    /// Changing page protection failed.
    Protection(String),
    /// Installing the fault interceptor failed.
    FaultHandler(String),
}

impl std::fmt::Display for TpsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TpsError::AlreadyInitialized => {
                write!(f, "a storage context already exists in this process")
            }
            TpsError::NoSegment => write!(f, "calling thread has no storage segment"),
            TpsError::SegmentExists => write!(f, "calling thread already has a storage segment"),
            TpsError::TargetHasNoSegment => write!(f, "clone target has no storage segment"),
            TpsError::OutOfBounds { offset, len } => write!(
                f,
                "range {}..{} does not fit a {}-byte page",
                offset,
                offset + len,
                PAGE_SIZE
            ),
            TpsError::Allocation(msg) => write!(f, "page allocation failed: {}", msg),
            TpsError::Protection(msg) => write!(f, "page protection change failed: {}", msg),
            TpsError::FaultHandler(msg) => write!(f, "fault interceptor install failed: {}", msg),
        }
    }
}

impl std::error::Error for TpsError {}

impl From<PageError> for TpsError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::Map(msg) => TpsError::Allocation(msg),
            PageError::Protect(msg) => TpsError::Protection(msg),
        }
    }
}

// =============================================================================
// Directory
// =============================================================================

/// One thread's storage segment: a shared handle to its page.
///
/// The owning identity is the directory key.
struct Segment {
    page: Arc<Page>,
}

/// Directory state guarded by the critical section.
struct Directory {
    segments: FxHashMap<ThreadId, Segment>,
}

/// Marks the live storage context; only one may exist per process because
/// the fault interceptor and the one-segment-per-thread rule are both
/// process-wide.
static DIRECTORY_CLAIMED: AtomicBool = AtomicBool::new(false);

// =============================================================================
// Tps
// =============================================================================

/// Configuration for a storage context.
#[derive(Debug, Clone, Copy)]
pub struct TpsOptions {
    /// Install the fault interceptor for protection violations. Without it,
    /// an out-of-API access to a storage page is still fatal, just reported
    /// by the platform instead of the interceptor's diagnostic.
    pub install_fault_handler: bool,
}

impl Default for TpsOptions {
    fn default() -> Self {
        TpsOptions {
            install_fault_handler: true,
        }
    }
}

/// The storage context: segment directory plus collaborators.
///
/// Dropping the context releases every remaining segment, the process-wide
/// claim, and the interceptor's installed state.
pub struct Tps {
    sched: Arc<dyn Scheduler>,
    critical: CriticalSection<Directory>,
    stats: TpsStats,
    installed_handler: bool,
}

impl Tps {
    /// Create the process's storage context.
    ///
    /// Fails with [`TpsError::AlreadyInitialized`] while another context is
    /// live, regardless of options.
    pub fn new(options: TpsOptions, sched: Arc<dyn Scheduler>) -> Result<Self, TpsError> {
        if DIRECTORY_CLAIMED.swap(true, Ordering::AcqRel) {
            return Err(TpsError::AlreadyInitialized);
        }

        let installed_handler = if options.install_fault_handler {
            if let Err(err) = handler::install() {
                DIRECTORY_CLAIMED.store(false, Ordering::Release);
                return Err(TpsError::FaultHandler(err.to_string()));
            }
            true
        } else {
            false
        };

        Ok(Tps {
            sched,
            critical: CriticalSection::new(Directory {
                segments: FxHashMap::default(),
            }),
            stats: TpsStats::new(),
            installed_handler,
        })
    }

    /// Create a segment for the calling thread.
    ///
    /// The fresh page is zero-initialized, rests at protection NONE, and has
    /// a sharing count of one.
    pub fn create(&self) -> Result<(), TpsError> {
        let me = self.sched.current();
        let mut dir = self.critical.enter();
        if dir.segments.contains_key(&me) {
            return Err(TpsError::SegmentExists);
        }
        let page = Page::map()?;
        dir.segments.insert(me, Segment {
            page: Arc::new(page),
        });
        self.stats.record_segment_created();
        Ok(())
    }

    /// Destroy the calling thread's segment.
    ///
    /// The page unmaps when its last sharer detaches.
    pub fn destroy(&self) -> Result<(), TpsError> {
        let me = self.sched.current();
        let mut dir = self.critical.enter();
        if dir.segments.remove(&me).is_none() {
            return Err(TpsError::NoSegment);
        }
        self.stats.record_segment_destroyed();
        Ok(())
    }

    /// Copy `buf.len()` bytes out of the caller's segment starting at
    /// `offset`.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), TpsError> {
        check_bounds(offset, buf.len())?;
        let me = self.sched.current();
        let dir = self.critical.enter();
        let segment = dir.segments.get(&me).ok_or(TpsError::NoSegment)?;
        segment.page.read_at(offset, buf)?;
        self.stats.record_read();
        Ok(())
    }

    /// Copy `buf.len()` bytes from `buf` into the caller's segment at
    /// `offset`, privatizing a shared page first.
    pub fn write(&self, offset: usize, buf: &[u8]) -> Result<(), TpsError> {
        check_bounds(offset, buf.len())?;
        let me = self.sched.current();
        let mut dir = self.critical.enter();
        let segment = dir.segments.get_mut(&me).ok_or(TpsError::NoSegment)?;

        if Arc::strong_count(&segment.page) > 1 {
            let private = Page::map()?;
            private.copy_from(&segment.page)?;
            // Swapping the handle is what detaches this segment from the
            // shared record; its count drops by exactly this one reference.
            segment.page = Arc::new(private);
            self.stats.record_cow_copy();
        }

        segment.page.write_at(offset, buf)?;
        self.stats.record_write();
        Ok(())
    }

    /// Create a segment for the calling thread that shares `target`'s page.
    pub fn clone_from(&self, target: ThreadId) -> Result<(), TpsError> {
        let me = self.sched.current();
        let mut dir = self.critical.enter();
        let Some(source) = dir.segments.get(&target) else {
            return Err(TpsError::TargetHasNoSegment);
        };
        let shared = Arc::clone(&source.page);
        if dir.segments.contains_key(&me) {
            return Err(TpsError::SegmentExists);
        }
        dir.segments.insert(me, Segment { page: shared });
        self.stats.record_clone();
        Ok(())
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Number of registered segments.
    pub fn segment_count(&self) -> usize {
        self.critical.enter().segments.len()
    }

    /// Sum of sharing counts across all distinct pages.
    ///
    /// Always equals [`Tps::segment_count`]: every live segment holds exactly
    /// one page reference and nothing else holds any.
    pub fn total_page_refs(&self) -> usize {
        let dir = self.critical.enter();
        let mut seen = FxHashSet::default();
        let mut total = 0;
        for segment in dir.segments.values() {
            if seen.insert(segment.page.base_addr()) {
                total += Arc::strong_count(&segment.page);
            }
        }
        total
    }

    /// Operation counters for this context.
    pub fn stats(&self) -> &TpsStats {
        &self.stats
    }
}

impl Drop for Tps {
    fn drop(&mut self) {
        if self.installed_handler {
            let _ = handler::uninstall();
        }
        DIRECTORY_CLAIMED.store(false, Ordering::Release);
    }
}

/// Validate that `offset + len` fits the page.
fn check_bounds(offset: usize, len: usize) -> Result<(), TpsError> {
    match offset.checked_add(len) {
        Some(end) if end <= PAGE_SIZE => Ok(()),
        _ => Err(TpsError::OutOfBounds { offset, len }),
    }
}

// =============================================================================
// Tests
// =============================================================================
