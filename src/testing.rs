//! Testing helpers for library users.
//!
//! - [`CountingJob`]: records how many times it ran
//! - [`FailingJob`]: fails a configurable number of times, then succeeds

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::core::job::{Job, JobError};

/// A job that counts its executions.
///
/// The counter handle is shareable, so the count stays observable after
/// the job has been handed to a scheduler.
///
/// # Example
///
/// ```
/// use metronome::testing::CountingJob;
///
/// let job = CountingJob::new("probe");
/// let counter = job.counter();
/// assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
/// ```
pub struct CountingJob {
    name: String,
    runs: Arc<AtomicU32>,
}

impl CountingJob {
    /// Create a counting job.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Handle for observing the run count from outside the scheduler.
    pub fn counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.runs)
    }

    /// Number of completed runs.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for CountingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A job that fails `fail_count` times then succeeds.
///
/// Pass `u32::MAX` for a job that always fails.
pub struct FailingJob {
    name: String,
    failures_remaining: AtomicU32,
    message: String,
}

impl FailingJob {
    /// Create a job that fails `fail_count` times.
    pub fn new(name: impl Into<String>, fail_count: u32) -> Self {
        Self {
            name: name.into(),
            failures_remaining: AtomicU32::new(fail_count),
            message: "intentional test failure".to_string(),
        }
    }

    /// Create a failing job with a custom error message.
    pub fn with_error(name: impl Into<String>, fail_count: u32, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures_remaining: AtomicU32::new(fail_count),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Job for FailingJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<(), JobError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            return Ok(());
        }
        if remaining != u32::MAX {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
        }
        Err(JobError::Failed(self.message.clone()))
    }
}
