//! The job capability consumed by the scheduler.
//!
//! A job exposes a single operation: run to completion or return an error.
//! The scheduler never interprets the error beyond deciding whether the
//! sweep should continue; everything the job needs must be captured inside
//! the implementation (typically via a callback into its owner).

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a job implementation.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job failed with a message.
    #[error("job failed: {0}")]
    Failed(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The unit of work driven by the scheduler.
///
/// # Example
///
/// ```ignore
/// use metronome::{Job, JobError};
/// use async_trait::async_trait;
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Job for Heartbeat {
///     fn name(&self) -> &str {
///         "heartbeat"
///     }
///
///     async fn run(&self) -> Result<(), JobError> {
///         // ping a health endpoint, refresh a lease, ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync {
    /// Name used for logging and for naming detached worker threads.
    fn name(&self) -> &str;

    /// Run the job.
    ///
    /// Inline jobs run in the sweep's own context, so a returned error
    /// surfaces to whoever drove the sweep. Detached jobs run in an
    /// isolated worker whose outcome is never observed by the scheduler.
    async fn run(&self) -> Result<(), JobError>;
}
