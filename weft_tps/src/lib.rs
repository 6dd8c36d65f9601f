//! Thread-private storage backed by hardware-protected pages.
//!
//! Each thread may own at most one storage segment: a page-sized region of
//! anonymous memory that rests at protection NONE and becomes accessible only
//! inside the [`Tps::read`] and [`Tps::write`] entry points. Segments are
//! shared by [`Tps::clone_from`] and lazily duplicated on the first write to
//! a shared page (copy-on-write), so cloning is cheap until someone mutates.
//!
//! # Misuse detection
//!
//! Touching a storage page outside the API raises a protection fault. When
//! the fault interceptor is installed ([`TpsOptions::install_fault_handler`]),
//! the fault is matched against the registered pages, a diagnostic is written
//! to stderr, and the signal is re-delivered with its default disposition so
//! the process terminates. This path is unrecoverable by contract: an
//! out-of-API access is a programming error that cannot be safely continued.
//! Without the interceptor, such violations remain ordinary fatal crashes,
//! just without the diagnostic.

pub mod handler;
pub mod page;
pub mod registry;
pub mod stats;

pub use page::{PAGE_SIZE, Page, PageError, Protection};
pub use registry::{Tps, TpsError, TpsOptions};
pub use stats::TpsStats;
