//! The scheduled-job wrapper.
//!
//! A [`ScheduledJob`] couples a job capability to its trigger policy, an
//! execution mode (inline or detached), a run-count limit, and the secret
//! gating runtime reconfiguration. Wrappers are created through the
//! registry's factory and mutated in place by authenticated updates.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::core::job::{Job, JobError};
use crate::core::trigger::{TriggerMode, TriggerPolicy};

/// Field overwrites applied by an authenticated [`ScheduledJob::update`].
///
/// Only supplied fields are touched. Supplying a mode and/or interval
/// rebuilds the trigger policy from construction defaults.
#[derive(Default)]
pub struct JobUpdate {
    /// Replacement job capability.
    pub job: Option<Arc<dyn Job>>,
    /// Replacement trigger mode.
    pub mode: Option<TriggerMode>,
    /// Replacement interval (seconds or ticks, per the effective mode).
    pub interval: Option<u64>,
    /// Replacement run limit. Zero clears the limit, reopening a wrapper
    /// that had reached it.
    pub limit: Option<u32>,
    /// Replacement detach flag.
    pub detach: Option<bool>,
    /// Replacement reconfiguration secret.
    pub secret: Option<String>,
}

impl fmt::Debug for JobUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobUpdate")
            .field("job", &self.job.as_ref().map(|j| j.name().to_string()))
            .field("mode", &self.mode)
            .field("interval", &self.interval)
            .field("limit", &self.limit)
            .field("detach", &self.detach)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A job bound to the policy deciding when it runs.
///
/// `run` applies two gates in order: the run-count limit (terminal once
/// reached, until an update raises or clears the limit) and the trigger
/// due-check. When both pass, the job executes inline in the caller's
/// context or in a detached fire-and-forget worker.
pub struct ScheduledJob {
    job: Arc<dyn Job>,
    trigger: TriggerPolicy,
    run_count: u32,
    run_limit: u32,
    detach: bool,
    secret: Option<String>,
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("job", &self.job.name())
            .field("trigger", &self.trigger)
            .field("run_count", &self.run_count)
            .field("run_limit", &self.run_limit)
            .field("detach", &self.detach)
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

impl ScheduledJob {
    /// Wrap a job with its trigger policy.
    pub fn new(job: Arc<dyn Job>, trigger: TriggerPolicy) -> Self {
        Self {
            job,
            trigger,
            run_count: 0,
            run_limit: 0,
            detach: false,
            secret: None,
        }
    }

    /// Cap the number of fires. Zero means unlimited.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.run_limit = limit;
        self
    }

    /// Execute in a detached worker instead of inline.
    pub fn with_detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }

    /// Set the secret required by [`update`](Self::update).
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Run the job if it is due at `now`.
    ///
    /// Returns whether the job fired this cycle. The flag carries no
    /// information about the job's own outcome: an inline error propagates
    /// instead, and a detached job's result is never observed. A failed
    /// detached spawn is logged and reported as "not run"; no retry is
    /// attempted.
    pub async fn run_at(&mut self, now: DateTime<Utc>) -> Result<bool, JobError> {
        // Limit gate first: no trigger evaluation, no side effects.
        if self.run_limit > 0 && self.run_count >= self.run_limit {
            return Ok(false);
        }

        if !self.trigger.evaluate(now) {
            return Ok(false);
        }

        if self.detach {
            if !self.spawn_detached() {
                return Ok(false);
            }
        } else {
            self.job.run().await?;
        }

        if self.run_limit > 0 {
            self.run_count += 1;
        }

        Ok(true)
    }

    /// Run the job if it is due now.
    pub async fn run(&mut self) -> Result<bool, JobError> {
        self.run_at(Utc::now()).await
    }

    /// Spawn an isolated worker for one detached execution.
    ///
    /// The worker owns its own single-thread runtime and shares nothing
    /// with the sweep beyond the job handle captured at spawn time. Output
    /// must go through a channel the job opens itself (a file, a fresh
    /// connection); the parent's context is not safe to rely on.
    fn spawn_detached(&self) -> bool {
        let job = Arc::clone(&self.job);
        let name = job.name().to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("metronome-{name}"))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        tracing::warn!(job = %name, error = %error, "Detached worker could not build a runtime");
                        return;
                    }
                };
                if let Err(error) = runtime.block_on(job.run()) {
                    tracing::warn!(job = %name, error = %error, "Detached job failed");
                }
            });

        match spawned {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(job = %self.job.name(), error = %error, "Failed to spawn detached worker");
                false
            }
        }
    }

    /// Check a reconfiguration secret.
    ///
    /// The comparison is constant-time. A wrapper without a secret accepts
    /// only an absent one.
    pub fn authenticate(&self, secret: Option<&str>) -> bool {
        match (&self.secret, secret) {
            (Some(stored), Some(given)) => stored.as_bytes().ct_eq(given.as_bytes()).into(),
            (None, None) => true,
            _ => false,
        }
    }

    /// Apply authenticated field overwrites at `now`.
    ///
    /// Refuses without mutation unless `secret` matches. A supplied mode or
    /// interval rebuilds the trigger policy from construction defaults, so
    /// a time trigger's first deadline and a tick trigger's cursor restart
    /// as if newly scheduled at `now`.
    pub fn update_at(&mut self, update: JobUpdate, secret: Option<&str>, now: DateTime<Utc>) -> bool {
        if !self.authenticate(secret) {
            return false;
        }

        if update.mode.is_some() || update.interval.is_some() {
            let mode = update.mode.unwrap_or_else(|| self.trigger.mode());
            let interval = update.interval.unwrap_or_else(|| self.trigger.interval());
            self.trigger = TriggerPolicy::new(mode, interval, None, None, now);
        }
        if let Some(job) = update.job {
            self.job = job;
        }
        if let Some(limit) = update.limit {
            self.run_limit = limit;
        }
        if let Some(detach) = update.detach {
            self.detach = detach;
        }
        if let Some(secret) = update.secret {
            self.secret = Some(secret);
        }

        true
    }

    /// Apply authenticated field overwrites.
    pub fn update(&mut self, update: JobUpdate, secret: Option<&str>) -> bool {
        self.update_at(update, secret, Utc::now())
    }

    /// Name of the wrapped job.
    pub fn job_name(&self) -> &str {
        self.job.name()
    }

    /// The active trigger policy.
    pub fn trigger(&self) -> &TriggerPolicy {
        &self.trigger
    }

    /// Number of counted fires so far.
    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    /// Maximum number of fires (0 = unlimited).
    pub fn run_limit(&self) -> u32 {
        self.run_limit
    }

    /// Whether the job executes in a detached worker.
    pub fn is_detached(&self) -> bool {
        self.detach
    }
}
