//! Embeddable in-process job scheduler.
//!
//! Jobs are opaque work units implementing [`Job`]. Each is wrapped with a
//! [`TriggerPolicy`] deciding when it is due (a wall-clock interval or a
//! tick counter advanced once per dispatch sweep), plus an execution mode
//! (inline or detached), an optional run limit, and a secret gating runtime
//! reconfiguration. A [`Scheduler`] owns the wrappers behind a key-based
//! authentication gate; a host-managed driver invokes
//! [`Scheduler::run_pending`] repeatedly to dispatch whatever is due.
//!
//! There is no catch-up for missed sweeps, no exactly-once guarantee, and
//! no coordination across scheduler instances.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::Ordering;
//! use metronome::{ScheduleOptions, Scheduler};
//! use metronome::testing::CountingJob;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut scheduler = Scheduler::new("master");
//! let job = Arc::new(CountingJob::new("heartbeat"));
//! let counter = job.counter();
//!
//! let options = ScheduleOptions {
//!     key: "master".to_string(),
//!     interval: 5,
//!     ..Default::default()
//! };
//! scheduler.schedule_job(job, "time", options).unwrap();
//!
//! // First sweep fires immediately; the next is due five seconds later.
//! assert!(scheduler.run_pending().await.unwrap());
//! assert_eq!(counter.load(Ordering::SeqCst), 1);
//! # }
//! ```

pub mod config;
pub mod core;
pub mod scheduler;
pub mod testing;

pub use crate::config::SchedulerConfig;
pub use crate::core::job::{Job, JobError};
pub use crate::core::trigger::{TriggerError, TriggerMode, TriggerPolicy};
pub use crate::scheduler::entry::{JobUpdate, ScheduledJob};
pub use crate::scheduler::registry::{
    AuthKey, ScheduleEntry, ScheduleOptions, Scheduler, SchedulerError,
};
