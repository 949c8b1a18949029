//! Job state and progress streaming.
//!
//! The store is the single source of truth for movie status. Every accepted
//! transition is also published on the progress broadcaster so any number of
//! listeners can follow jobs in real time.

pub mod job_progress;
pub mod job_store;
pub mod watchdog;

pub use job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use job_store::{JobCounts, JobStore};
pub use watchdog::Watchdog;
