//! Counting semaphore with FIFO blocking for the weft thread library.
//!
//! The semaphore guards a finite resource count. Threads that find the count
//! exhausted are suspended through the library's
//! [`Scheduler`](weft_core::Scheduler) capability and released strictly in
//! arrival order, one per release of the resource, so no waiter starves as
//! long as every acquisition is eventually matched by a release.

pub mod semaphore;

pub use semaphore::{SemError, SemPermit, Semaphore};
