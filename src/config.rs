//! Scheduler configuration.
//!
//! Mirrors the constructor surface. The inbound request pipe and the
//! durable schedule target are accepted and stored for future wiring; the
//! core reads neither.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::scheduler::registry::AuthKey;

/// Configuration for building a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Named pipe used to receive job requests at runtime (future wiring).
    pub pipe: Option<PathBuf>,
    /// Key or set of keys authorizing requests. Defaults to the empty key.
    pub key: AuthKey,
    /// File backing schedule load/save across restarts (future wiring).
    pub schedule_file: Option<PathBuf>,
    /// Allow errors marked fatal to abort the caller.
    pub allow_fatal: bool,
}
