//! Core collaborator surface for the weft threading primitives.
//!
//! The synchronization (`weft_sync`) and private-storage (`weft_tps`) crates
//! both sit on top of three small capabilities defined here:
//!
//! - [`ThreadId`] — an opaque, copyable thread identity used to key the
//!   storage directory and to order semaphore waiters.
//! - [`Scheduler`] — the suspend/resume capability of the surrounding thread
//!   library, consumed as a trait so the primitives stay independent of any
//!   particular scheduler. [`OsScheduler`] is the hosted implementation over
//!   `std::thread` park/unpark.
//! - [`CriticalSection`] — a non-reentrant mutual-exclusion region guarding
//!   every state transition of the primitives built above it.

pub mod critical;
pub mod ident;
pub mod sched;

pub use critical::{CriticalGuard, CriticalSection};
pub use ident::ThreadId;
pub use sched::{OsScheduler, Scheduler};
