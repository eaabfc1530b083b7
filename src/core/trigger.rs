//! Trigger policies deciding whether a job is due.
//!
//! Two variants are supported: time triggers that track an absolute next
//! deadline, and tick triggers driven by a counter advanced once per
//! evaluation call. A wrapper owns exactly one variant, fixed at
//! construction and only replaced wholesale by an authenticated update.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when selecting a trigger.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Unrecognized trigger mode.
    #[error("invalid trigger mode: {0}")]
    InvalidMode(String),
}

/// The kind of trigger driving a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Due when a wall-clock deadline has passed.
    Time,
    /// Due when enough evaluation calls have accumulated.
    Tick,
}

impl FromStr for TriggerMode {
    type Err = TriggerError;

    /// Parse a mode string.
    ///
    /// Accepts `time`/`t` and `tick`/`c`, case-insensitive. The one-letter
    /// forms match the original request format.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" | "t" => Ok(TriggerMode::Time),
            "tick" | "c" => Ok(TriggerMode::Tick),
            _ => Err(TriggerError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Time => write!(f, "time"),
            TriggerMode::Tick => write!(f, "tick"),
        }
    }
}

/// A trigger policy owning the mutable due-check state for one job.
///
/// Evaluation has side effects: a due time trigger advances its deadline
/// from the firing instant (bounded drift under sustained overload rather
/// than catch-up bursts), and a tick trigger counts every evaluation call
/// as one tick once its start instant has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TriggerPolicy {
    /// Fires when `now` reaches the next absolute deadline.
    Time {
        /// Seconds between fires. Zero means due on every evaluation.
        interval_secs: u64,
        /// The next deadline.
        next_fire_at: DateTime<Utc>,
    },
    /// Fires every `interval_ticks` evaluation calls.
    Tick {
        /// Evaluation calls between fires. Zero means due on every call.
        interval_ticks: u64,
        /// Position within the current interval.
        cursor: u64,
        /// Evaluations before this instant are never due.
        start_at: Option<DateTime<Utc>>,
    },
}

impl TriggerPolicy {
    /// Build a policy for the given mode.
    ///
    /// For time triggers the first deadline is `start_time` (defaulting to
    /// `now`) plus `cursor * interval` seconds, so with no cursor and no
    /// start time the first evaluation fires immediately. For tick triggers
    /// the cursor defaults to the full interval so the first evaluation
    /// past `start_time` fires.
    pub fn new(
        mode: TriggerMode,
        interval: u64,
        cursor: Option<u64>,
        start_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match mode {
            TriggerMode::Time => {
                let offset = cursor.unwrap_or(0).saturating_mul(interval);
                TriggerPolicy::Time {
                    interval_secs: interval,
                    next_fire_at: start_time.unwrap_or(now) + Duration::seconds(offset as i64),
                }
            }
            TriggerMode::Tick => TriggerPolicy::Tick {
                interval_ticks: interval,
                cursor: cursor.unwrap_or(interval),
                start_at: start_time,
            },
        }
    }

    /// Check whether the job is due at `now`, advancing internal state.
    ///
    /// Every call counts as one tick for tick triggers, so the caller's
    /// sweep frequency determines their real-time granularity.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> bool {
        match self {
            TriggerPolicy::Time {
                interval_secs,
                next_fire_at,
            } => {
                if now < *next_fire_at {
                    return false;
                }
                *next_fire_at = now + Duration::seconds(*interval_secs as i64);
                true
            }
            TriggerPolicy::Tick {
                interval_ticks,
                cursor,
                start_at,
            } => {
                if start_at.is_some_and(|start| now < start) {
                    return false;
                }
                *cursor = cursor.saturating_add(1);
                if *cursor >= *interval_ticks {
                    *cursor = 0;
                    return true;
                }
                false
            }
        }
    }

    /// Get the active mode.
    pub fn mode(&self) -> TriggerMode {
        match self {
            TriggerPolicy::Time { .. } => TriggerMode::Time,
            TriggerPolicy::Tick { .. } => TriggerMode::Tick,
        }
    }

    /// Get the interval, in seconds or ticks depending on the mode.
    pub fn interval(&self) -> u64 {
        match self {
            TriggerPolicy::Time { interval_secs, .. } => *interval_secs,
            TriggerPolicy::Tick { interval_ticks, .. } => *interval_ticks,
        }
    }

    /// Get the next deadline. `None` for tick triggers.
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TriggerPolicy::Time { next_fire_at, .. } => Some(*next_fire_at),
            TriggerPolicy::Tick { .. } => None,
        }
    }

    /// Get the tick cursor. `None` for time triggers.
    pub fn cursor(&self) -> Option<u64> {
        match self {
            TriggerPolicy::Time { .. } => None,
            TriggerPolicy::Tick { cursor, .. } => Some(*cursor),
        }
    }
}
