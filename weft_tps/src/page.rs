//! Protected storage pages.
//!
//! A [`Page`] is a single protection granule of anonymous, zero-initialized
//! memory mapped with `mmap`. Its resting protection is NONE; the access
//! methods raise it to READ or WRITE only for the duration of a copy and
//! restore it before returning, so the page is never reachable outside an
//! API call. Every mapped page is registered with the fault interceptor's
//! address table so an out-of-API access can be attributed to it.

use std::io;
use std::ptr::NonNull;

use libc::{MAP_ANONYMOUS, MAP_PRIVATE, PROT_NONE, PROT_READ, PROT_WRITE, c_void};

use crate::handler;

/// Size of one storage page: one protection granule.
///
/// Must match the granularity `mprotect` enforces, otherwise raising and
/// restoring protection would cover the wrong extent.
pub const PAGE_SIZE: usize = 4096;

// =============================================================================
// Protection
// =============================================================================

/// Access permitted on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// No access; the resting state.
    None,
    /// Read-only, raised for the duration of a copy out.
    Read,
    /// Write-only, raised for the duration of a copy in.
    Write,
}

impl Protection {
    #[inline]
    fn as_raw(self) -> libc::c_int {
        match self {
            Protection::None => PROT_NONE,
            Protection::Read => PROT_READ,
            Protection::Write => PROT_WRITE,
        }
    }
}

// =============================================================================
// PageError
// =============================================================================

/// Failure outcomes of page operations.
#[derive(Debug, Clone)]
pub enum PageError {
    /// Mapping the page failed.
    Map(String),
    /// Changing the page's protection failed.
    Protect(String),
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageError::Map(msg) => write!(f, "page mapping failed: {}", msg),
            PageError::Protect(msg) => write!(f, "page protection change failed: {}", msg),
        }
    }
}

impl std::error::Error for PageError {}

// =============================================================================
// Page
// =============================================================================

/// One mapped storage page.
///
/// Unmapped (and removed from the fault interceptor's table) on drop.
pub struct Page {
    base: NonNull<u8>,
}

// Safety: the raw base pointer is only dereferenced by the access methods,
// and every caller serializes those through a critical section.
unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Page {
    /// Map a fresh anonymous page at protection NONE.
    ///
    /// Anonymous mappings are zero-initialized, so a new page reads as all
    /// zeroes once protection is raised.
    pub fn map() -> Result<Self, PageError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                PAGE_SIZE,
                PROT_NONE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(PageError::Map(io::Error::last_os_error().to_string()));
        }
        let base = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| PageError::Map("mmap returned null".to_string()))?;

        handler::register_page(base.as_ptr() as usize);
        Ok(Page { base })
    }

    /// Base address of the page.
    #[inline]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Set the page's protection.
    pub fn set_protection(&self, protection: Protection) -> Result<(), PageError> {
        let result = unsafe {
            libc::mprotect(self.base.as_ptr() as *mut c_void, PAGE_SIZE, protection.as_raw())
        };
        if result != 0 {
            return Err(PageError::Protect(io::Error::last_os_error().to_string()));
        }
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `offset` out of the page.
    ///
    /// The page is readable only for the duration of the copy. Callers have
    /// already validated that `offset + buf.len()` fits the page.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<(), PageError> {
        debug_assert!(offset + buf.len() <= PAGE_SIZE);
        self.set_protection(Protection::Read)?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
        self.set_protection(Protection::None)
    }

    /// Copy `buf.len()` bytes from `buf` into the page at `offset`.
    ///
    /// The page is writable only for the duration of the copy. Callers have
    /// already validated that `offset + buf.len()` fits the page.
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<(), PageError> {
        debug_assert!(offset + buf.len() <= PAGE_SIZE);
        self.set_protection(Protection::Write)?;
        unsafe {
            std::ptr::copy_nonoverlapping(buf.as_ptr(), self.base.as_ptr().add(offset), buf.len());
        }
        self.set_protection(Protection::None)
    }

    /// Copy the full contents of `src` into this page.
    ///
    /// Used by the copy-on-write path to duplicate a shared page. Both pages
    /// return to protection NONE before this returns.
    pub fn copy_from(&self, src: &Page) -> Result<(), PageError> {
        src.set_protection(Protection::Read)?;
        self.set_protection(Protection::Write)?;
        unsafe {
            std::ptr::copy_nonoverlapping(src.base.as_ptr(), self.base.as_ptr(), PAGE_SIZE);
        }
        self.set_protection(Protection::None)?;
        src.set_protection(Protection::None)
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        handler::unregister_page(self.base.as_ptr() as usize);
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut c_void, PAGE_SIZE);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
