//! Operation counters for the storage subsystem.
//!
//! All counters are updated atomically, so reading them never takes the
//! critical section.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for storage operations.
#[derive(Debug, Default)]
pub struct TpsStats {
    /// Segments created.
    segments_created: AtomicU64,
    /// Segments destroyed.
    segments_destroyed: AtomicU64,
    /// Segments created by cloning another thread's segment.
    clones: AtomicU64,
    /// Shared pages privatized by a copy-on-write duplication.
    cow_copies: AtomicU64,
    /// Completed reads.
    reads: AtomicU64,
    /// Completed writes.
    writes: AtomicU64,
}

impl TpsStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_segment_created(&self) {
        self.segments_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_segment_destroyed(&self) {
        self.segments_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_clone(&self) {
        self.clones.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cow_copy(&self) {
        self.cow_copies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Total segments created.
    #[inline]
    pub fn segments_created(&self) -> u64 {
        self.segments_created.load(Ordering::Relaxed)
    }

    /// Total segments destroyed.
    #[inline]
    pub fn segments_destroyed(&self) -> u64 {
        self.segments_destroyed.load(Ordering::Relaxed)
    }

    /// Segments currently live.
    #[inline]
    pub fn live_segments(&self) -> u64 {
        self.segments_created() - self.segments_destroyed()
    }

    /// Total segments created by cloning.
    #[inline]
    pub fn clones(&self) -> u64 {
        self.clones.load(Ordering::Relaxed)
    }

    /// Total copy-on-write duplications.
    #[inline]
    pub fn cow_copies(&self) -> u64 {
        self.cow_copies.load(Ordering::Relaxed)
    }

    /// Total completed reads.
    #[inline]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total completed writes.
    #[inline]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for TpsStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Storage Statistics:")?;
        writeln!(f, "  Segments Created:   {}", self.segments_created())?;
        writeln!(f, "  Segments Destroyed: {}", self.segments_destroyed())?;
        writeln!(f, "  Live Segments:      {}", self.live_segments())?;
        writeln!(f, "  Clones:             {}", self.clones())?;
        writeln!(f, "  COW Copies:         {}", self.cow_copies())?;
        writeln!(f, "  Reads:              {}", self.reads())?;
        writeln!(f, "  Writes:             {}", self.writes())?;
        Ok(())
    }
}
