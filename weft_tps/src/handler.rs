//! Fault interceptor for storage protection violations.
//!
//! Storage pages rest at protection NONE, so any access outside the
//! `read`/`write` entry points raises SIGSEGV (SIGBUS on some platforms).
//! The interceptor installed here distinguishes those violations from
//! arbitrary faults by matching the faulting address against a table of
//! registered page bases, writes a diagnostic to stderr, then restores the
//! default disposition and re-delivers the signal so the process terminates.
//!
//! There is no recovery path: an out-of-API access to a storage page is a
//! programming error, and crashing is the contract.
//!
//! # Signal-handler constraints
//!
//! The handler may only use async-signal-safe operations, so the page table
//! is a fixed array of atomic slots (no locks, no allocation) and the
//! diagnostic goes out through a raw `write(2)`.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::page::PAGE_SIZE;

/// Capacity of the registered-page table.
///
/// One slot per mapped storage page. Pages mapped past this capacity still
/// fault on misuse; only the diagnostic's page match degrades.
const MAX_REGISTERED_PAGES: usize = 256;

/// Base addresses of all live storage pages; 0 marks a free slot.
static REGISTERED_PAGES: [AtomicUsize; MAX_REGISTERED_PAGES] =
    [const { AtomicUsize::new(0) }; MAX_REGISTERED_PAGES];

/// Whether the interceptor is currently installed.
static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

// =============================================================================
// HandlerError
// =============================================================================

/// Failure outcomes of interceptor installation.
#[derive(Debug, Clone)]
pub enum HandlerError {
    /// The interceptor is already installed.
    AlreadyInstalled,
    /// Registering the signal actions failed.
    InstallFailed(String),
    /// The interceptor is not installed.
    NotInstalled,
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::AlreadyInstalled => write!(f, "fault interceptor already installed"),
            HandlerError::InstallFailed(msg) => {
                write!(f, "fault interceptor install failed: {}", msg)
            }
            HandlerError::NotInstalled => write!(f, "fault interceptor not installed"),
        }
    }
}

impl std::error::Error for HandlerError {}

// =============================================================================
// Page table
// =============================================================================

/// Record a page base for fault attribution.
///
/// Returns false when the table is full; the page then faults without a
/// matched diagnostic, which is the documented degraded mode.
pub(crate) fn register_page(base: usize) -> bool {
    for slot in &REGISTERED_PAGES {
        if slot
            .compare_exchange(0, base, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return true;
        }
    }
    false
}

/// Remove a page base from the table.
pub(crate) fn unregister_page(base: usize) {
    for slot in &REGISTERED_PAGES {
        if slot
            .compare_exchange(base, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
    }
}

/// Whether `addr` falls inside a registered storage page.
pub fn is_registered_page(addr: usize) -> bool {
    let base = addr & !(PAGE_SIZE - 1);
    if base == 0 {
        return false;
    }
    REGISTERED_PAGES
        .iter()
        .any(|slot| slot.load(Ordering::Acquire) == base)
}

// =============================================================================
// Installation
// =============================================================================

/// Install the fault interceptor for SIGSEGV and SIGBUS.
///
/// Must be installed at most once per process; a second install fails with
/// [`HandlerError::AlreadyInstalled`] until [`uninstall`] runs.
pub fn install() -> Result<(), HandlerError> {
    if HANDLER_INSTALLED.swap(true, Ordering::AcqRel) {
        return Err(HandlerError::AlreadyInstalled);
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_sigaction = fault_handler as usize;
        action.sa_flags = libc::SA_SIGINFO;

        for signal in [libc::SIGSEGV, libc::SIGBUS] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                HANDLER_INSTALLED.store(false, Ordering::Release);
                return Err(HandlerError::InstallFailed(
                    io::Error::last_os_error().to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Release the interceptor's installed state.
///
/// The signal actions themselves stay registered; with the table empty a
/// later fault is reported as unmatched and still terminates the process,
/// which is the same outcome the default disposition produces.
pub fn uninstall() -> Result<(), HandlerError> {
    if !HANDLER_INSTALLED.swap(false, Ordering::AcqRel) {
        return Err(HandlerError::NotInstalled);
    }
    Ok(())
}

// =============================================================================
// Signal handler
// =============================================================================

const MATCHED_DIAGNOSTIC: &[u8] = b"weft_tps: protection violation on a private storage page\n";
const UNMATCHED_DIAGNOSTIC: &[u8] = b"weft_tps: protection violation outside private storage\n";

extern "C" fn fault_handler(
    signal: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    unsafe {
        let fault_addr = (*info).si_addr() as usize;

        let diagnostic = if is_registered_page(fault_addr) {
            MATCHED_DIAGNOSTIC
        } else {
            UNMATCHED_DIAGNOSTIC
        };
        libc::write(
            libc::STDERR_FILENO,
            diagnostic.as_ptr() as *const libc::c_void,
            diagnostic.len(),
        );

        // Restore the default dispositions and re-deliver so the process
        // terminates with the platform's normal fatal-fault behavior.
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        libc::sigaction(libc::SIGSEGV, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGBUS, &action, std::ptr::null_mut());
        libc::raise(signal);
    }
}

// =============================================================================
// Tests
// =============================================================================
