//! Core building blocks: the job capability and trigger policies.

pub mod job;
pub mod trigger;
