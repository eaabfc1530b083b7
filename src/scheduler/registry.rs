//! The scheduler registry: authenticated registration and dispatch sweeps.
//!
//! The registry owns the schedule (an insertion-ordered list of entries
//! plus an index from explicit identifier to position) and is the sole
//! construction path for scheduled jobs. An external driver (a poll loop or
//! periodic timer) invokes [`Scheduler::run_pending`] repeatedly; each sweep
//! walks the entries in registration order and reports whether any job
//! fired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::SchedulerConfig;
use crate::core::job::{Job, JobError};
use crate::core::trigger::{TriggerError, TriggerMode, TriggerPolicy};
use crate::scheduler::entry::{JobUpdate, ScheduledJob};

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The supplied key did not match the registry key.
    #[error("authentication failed")]
    Unauthorized,

    /// The explicit identifier is already registered.
    #[error("duplicate job id: {0}")]
    DuplicateId(String),

    /// Trigger construction failed.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// An inline job marked fatal failed during a sweep.
    #[error(transparent)]
    Job(#[from] JobError),

    /// The registration was abandoned under the non-fatal policy.
    #[error("job registration rejected")]
    Rejected,
}

/// The key (or set of keys) authorizing registration and update requests.
///
/// A key set is most useful on multi-developer systems where each caller
/// holds its own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthKey {
    /// A single shared key.
    Single(String),
    /// Any member of the set authenticates.
    Set(Vec<String>),
}

impl Default for AuthKey {
    /// The empty key, matching requests that carry no key.
    fn default() -> Self {
        AuthKey::Single(String::new())
    }
}

impl AuthKey {
    /// Check a supplied key. Each candidate comparison is constant-time.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            AuthKey::Single(expected) => expected.as_bytes().ct_eq(key.as_bytes()).into(),
            AuthKey::Set(keys) => keys.iter().fold(false, |hit, candidate| {
                hit | bool::from(candidate.as_bytes().ct_eq(key.as_bytes()))
            }),
        }
    }
}

impl From<&str> for AuthKey {
    fn from(key: &str) -> Self {
        AuthKey::Single(key.to_string())
    }
}

impl From<String> for AuthKey {
    fn from(key: String) -> Self {
        AuthKey::Single(key)
    }
}

impl From<Vec<String>> for AuthKey {
    fn from(keys: Vec<String>) -> Self {
        AuthKey::Set(keys)
    }
}

/// Options accepted by [`Scheduler::schedule_job`].
///
/// Unset fields keep the documented defaults: an empty key, a zero interval
/// (due on every sweep), no cursor, no limit, no start time, no secret,
/// positional insertion, inline execution, and fatal errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleOptions {
    /// Key checked against the registry key.
    pub key: String,
    /// Seconds (time mode) or sweeps (tick mode) between fires.
    pub interval: u64,
    /// Initial trigger offset; see [`TriggerPolicy::new`].
    pub cursor: Option<u64>,
    /// Maximum number of fires (0 = unlimited).
    pub limit: u32,
    /// Instant before which the job never fires.
    pub start_time: Option<DateTime<Utc>>,
    /// Secret required for later reconfiguration.
    pub secret: Option<String>,
    /// Explicit identifier enabling lookups and update requests.
    pub id: Option<String>,
    /// Execute in a detached worker.
    pub detach: bool,
    /// Whether this entry's errors may abort the caller. Effective only
    /// when the registry also allows fatal errors.
    pub fatal: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            key: String::new(),
            interval: 0,
            cursor: None,
            limit: 0,
            start_time: None,
            secret: None,
            id: None,
            detach: false,
            fatal: true,
        }
    }
}

/// A registered wrapper plus its effective fatal flag.
#[derive(Debug)]
pub struct ScheduleEntry {
    id: Option<String>,
    job: ScheduledJob,
    /// Set only when both the registration option and the registry's
    /// `allow_fatal` were true; it must not be in the job's power alone.
    fatal: bool,
}

impl ScheduleEntry {
    /// The explicit identifier, if one was given at registration.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The wrapped job.
    pub fn job(&self) -> &ScheduledJob {
        &self.job
    }

    /// Whether this entry's failures abort the sweep.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

/// The registry owning the schedule.
///
/// Registration and sweeps are expected to run in one execution context;
/// callers exposing a scheduler to concurrent contexts must serialize its
/// mutation themselves (one lock around registration and sweep preserves
/// the ordering and uniqueness invariants).
pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
    index: HashMap<String, usize>,
    key: AuthKey,
    /// Named channel for runtime job requests. Accepted and stored for
    /// future wiring; never read by the core.
    pipe: Option<PathBuf>,
    /// Durable schedule target. Accepted and stored for future wiring;
    /// never read by the core.
    schedule_file: Option<PathBuf>,
    allow_fatal: bool,
}

impl Scheduler {
    /// Create a registry gated by the given key or key set.
    pub fn new(key: impl Into<AuthKey>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            key: key.into(),
            pipe: None,
            schedule_file: None,
            allow_fatal: false,
        }
    }

    /// Build a registry from configuration.
    pub fn from_config(config: SchedulerConfig) -> Self {
        let mut scheduler = Scheduler::new(config.key).with_allow_fatal(config.allow_fatal);
        scheduler.pipe = config.pipe;
        scheduler.schedule_file = config.schedule_file;
        scheduler
    }

    /// Set the named channel for runtime job requests (future wiring).
    pub fn with_pipe(mut self, pipe: impl Into<PathBuf>) -> Self {
        self.pipe = Some(pipe.into());
        self
    }

    /// Set the durable schedule target (future wiring).
    pub fn with_schedule_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schedule_file = Some(path.into());
        self
    }

    /// Allow errors marked fatal to abort registration or a sweep.
    /// This is not usually needed.
    pub fn with_allow_fatal(mut self, allow: bool) -> Self {
        self.allow_fatal = allow;
        self
    }

    /// The configured request pipe, if any.
    pub fn pipe(&self) -> Option<&Path> {
        self.pipe.as_deref()
    }

    /// The configured schedule persistence target, if any.
    pub fn schedule_file(&self) -> Option<&Path> {
        self.schedule_file.as_deref()
    }

    /// Validate a request key against the registry key.
    pub fn authenticate(&self, key: &str) -> bool {
        self.key.matches(key)
    }

    /// Add a job to the schedule. This is the only factory for entries.
    ///
    /// Refuses without mutation when the key does not authenticate or the
    /// explicit id already exists. A trigger construction error propagates
    /// only when both `options.fatal` and the registry's `allow_fatal` are
    /// set; otherwise the registration is abandoned with
    /// [`SchedulerError::Rejected`] and no entry is created.
    pub fn schedule_job(
        &mut self,
        job: Arc<dyn Job>,
        mode: &str,
        options: ScheduleOptions,
    ) -> Result<(), SchedulerError> {
        self.schedule_job_at(job, mode, options, Utc::now())
    }

    /// [`schedule_job`](Self::schedule_job) with an explicit construction
    /// instant, for callers driving a simulated clock.
    pub fn schedule_job_at(
        &mut self,
        job: Arc<dyn Job>,
        mode: &str,
        options: ScheduleOptions,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        if !self.authenticate(&options.key) {
            return Err(SchedulerError::Unauthorized);
        }

        let mode = match mode.parse::<TriggerMode>() {
            Ok(mode) => mode,
            Err(error) => {
                if options.fatal && self.allow_fatal {
                    return Err(error.into());
                }
                tracing::warn!(job = %job.name(), error = %error, "Registration abandoned");
                return Err(SchedulerError::Rejected);
            }
        };

        if let Some(id) = &options.id {
            if self.index.contains_key(id) {
                return Err(SchedulerError::DuplicateId(id.clone()));
            }
        }

        let trigger =
            TriggerPolicy::new(mode, options.interval, options.cursor, options.start_time, now);
        let mut scheduled = ScheduledJob::new(job, trigger)
            .with_limit(options.limit)
            .with_detach(options.detach);
        if let Some(secret) = options.secret {
            scheduled = scheduled.with_secret(secret);
        }

        if let Some(id) = &options.id {
            self.index.insert(id.clone(), self.entries.len());
        }
        self.entries.push(ScheduleEntry {
            id: options.id,
            job: scheduled,
            fatal: options.fatal && self.allow_fatal,
        });

        Ok(())
    }

    /// One dispatch sweep over the schedule.
    ///
    /// Returns whether any job fired, not whether every job succeeded. An
    /// inline failure aborts the sweep only for entries registered as
    /// fatal; otherwise it is logged and the sweep continues.
    pub async fn run_pending(&mut self) -> Result<bool, SchedulerError> {
        self.run_pending_at(Utc::now()).await
    }

    /// [`run_pending`](Self::run_pending) at an explicit instant, for
    /// callers driving a simulated clock.
    pub async fn run_pending_at(&mut self, now: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let mut fired = false;
        for entry in &mut self.entries {
            match entry.job.run_at(now).await {
                Ok(ran) => {
                    if ran {
                        tracing::debug!(job = %entry.job.job_name(), id = ?entry.id, "Job fired");
                    }
                    fired |= ran;
                }
                Err(error) if entry.fatal => return Err(error.into()),
                Err(error) => {
                    tracing::warn!(job = %entry.job.job_name(), id = ?entry.id, error = %error, "Job failed during sweep");
                }
            }
        }
        Ok(fired)
    }

    /// Apply an authenticated update to the job registered under `id`.
    ///
    /// Returns false when the id is unknown or the secret does not match;
    /// no fields change in either case.
    pub fn update_job(&mut self, id: &str, update: JobUpdate, secret: Option<&str>) -> bool {
        match self.index.get(id).copied() {
            Some(position) => self.entries[position].job.update(update, secret),
            None => false,
        }
    }

    /// Look up an entry by explicit identifier.
    pub fn get(&self, id: &str) -> Option<&ScheduleEntry> {
        self.index.get(id).map(|position| &self.entries[*position])
    }

    /// Whether an explicit identifier is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All entries in registration order.
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schedule is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingJob;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn keyed_options(key: &str) -> ScheduleOptions {
        ScheduleOptions {
            key: key.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_authenticate_single_key() {
        let scheduler = Scheduler::new("master");
        assert!(scheduler.authenticate("master"));
        assert!(!scheduler.authenticate("other"));
        assert!(!scheduler.authenticate(""));
    }

    #[test]
    fn test_authenticate_key_set_membership() {
        let keys = vec!["alice".to_string(), "bob".to_string()];
        let scheduler = Scheduler::new(keys);
        assert!(scheduler.authenticate("alice"));
        assert!(scheduler.authenticate("bob"));
        assert!(!scheduler.authenticate("mallory"));
    }

    #[test]
    fn test_default_key_accepts_empty_requests() {
        let mut scheduler = Scheduler::new(AuthKey::default());
        let job = Arc::new(CountingJob::new("open"));
        assert!(scheduler
            .schedule_job_at(job, "time", ScheduleOptions::default(), at(0))
            .is_ok());
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_schedule_job_refuses_wrong_key() {
        let mut scheduler = Scheduler::new("master");
        let job = Arc::new(CountingJob::new("denied"));

        let result = scheduler.schedule_job_at(job, "time", keyed_options("wrong"), at(0));
        assert!(matches!(result, Err(SchedulerError::Unauthorized)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let mut scheduler = Scheduler::new("k");
        let first = Arc::new(CountingJob::new("first"));
        let second = Arc::new(CountingJob::new("second"));

        let mut options = keyed_options("k");
        options.id = Some("x".to_string());
        scheduler
            .schedule_job_at(first, "time", options.clone(), at(0))
            .unwrap();

        let result = scheduler.schedule_job_at(second, "time", options, at(0));
        assert!(matches!(result, Err(SchedulerError::DuplicateId(_))));

        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.get("x").unwrap().job().job_name(), "first");
    }

    #[test]
    fn test_invalid_mode_propagates_when_fatal_allowed() {
        let mut scheduler = Scheduler::new("k").with_allow_fatal(true);
        let job = Arc::new(CountingJob::new("bad"));

        let result = scheduler.schedule_job_at(job, "hourly", keyed_options("k"), at(0));
        assert!(matches!(
            result,
            Err(SchedulerError::Trigger(TriggerError::InvalidMode(_)))
        ));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_invalid_mode_abandoned_when_not_allowed() {
        let mut scheduler = Scheduler::new("k");
        let job = Arc::new(CountingJob::new("bad"));

        let result = scheduler.schedule_job_at(job, "hourly", keyed_options("k"), at(0));
        assert!(matches!(result, Err(SchedulerError::Rejected)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_invalid_mode_abandoned_when_entry_not_fatal() {
        let mut scheduler = Scheduler::new("k").with_allow_fatal(true);
        let job = Arc::new(CountingJob::new("bad"));

        let mut options = keyed_options("k");
        options.fatal = false;
        let result = scheduler.schedule_job_at(job, "hourly", options, at(0));
        assert!(matches!(result, Err(SchedulerError::Rejected)));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_entry_fatal_requires_registry_permission() {
        let mut scheduler = Scheduler::new("k");
        let job = Arc::new(CountingJob::new("wants-fatal"));

        let mut options = keyed_options("k");
        options.id = Some("j".to_string());
        options.fatal = true;
        scheduler.schedule_job_at(job, "time", options, at(0)).unwrap();

        // allow_fatal is off, so the per-job request cannot take effect.
        assert!(!scheduler.get("j").unwrap().is_fatal());
    }

    #[tokio::test]
    async fn test_sweep_preserves_registration_order() {
        let mut scheduler = Scheduler::new("k");

        let keyed = Arc::new(CountingJob::new("keyed"));
        let positional = Arc::new(CountingJob::new("positional"));

        let mut options = keyed_options("k");
        options.id = Some("keyed".to_string());
        scheduler
            .schedule_job_at(keyed, "time", options, at(0))
            .unwrap();
        scheduler
            .schedule_job_at(positional, "time", keyed_options("k"), at(0))
            .unwrap();

        let names: Vec<&str> = scheduler
            .entries()
            .iter()
            .map(|entry| entry.job().job_name())
            .collect();
        assert_eq!(names, ["keyed", "positional"]);
    }

    #[tokio::test]
    async fn test_sweep_reports_whether_any_job_fired() {
        let mut scheduler = Scheduler::new("k");

        let due = Arc::new(CountingJob::new("due"));
        let idle = Arc::new(CountingJob::new("idle"));

        let mut prompt = keyed_options("k");
        prompt.interval = 30;
        scheduler
            .schedule_job_at(due, "time", prompt, at(0))
            .unwrap();
        let mut delayed = keyed_options("k");
        delayed.interval = 60;
        delayed.cursor = Some(1);
        scheduler
            .schedule_job_at(idle, "time", delayed, at(0))
            .unwrap();

        assert!(scheduler.run_pending_at(at(0)).await.unwrap());
        // Nothing due right after: the fired job waits out its interval.
        assert!(!scheduler.run_pending_at(at(0)).await.unwrap());
    }

    #[test]
    fn test_update_job_unknown_id_returns_false() {
        let mut scheduler = Scheduler::new("k");
        assert!(!scheduler.update_job("ghost", JobUpdate::default(), None));
    }

    #[test]
    fn test_from_config_applies_key_and_fatal_policy() {
        let config = SchedulerConfig {
            key: AuthKey::Set(vec!["a".to_string()]),
            allow_fatal: true,
            pipe: Some("/run/metronome.pipe".into()),
            schedule_file: None,
        };
        let mut scheduler = Scheduler::from_config(config);
        assert!(scheduler.authenticate("a"));
        assert_eq!(scheduler.pipe(), Some(Path::new("/run/metronome.pipe")));

        let job = Arc::new(CountingJob::new("bad"));
        let result = scheduler.schedule_job_at(job, "nope", keyed_options("a"), at(0));
        assert!(matches!(result, Err(SchedulerError::Trigger(_))));
    }
}
