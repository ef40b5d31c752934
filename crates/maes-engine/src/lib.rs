//! Assessment engine
//!
//! Drives one benchmark run against one tenant: ordered control
//! evaluation, per-control error capture, monotonic progress, scoring and
//! terminal idempotence. The comparator diffs two completed runs.

pub mod compare;
pub mod engine;

pub use compare::{
    AssessmentDiff, ChangeClass, Comparator, ControlChange, DiffCounts, Significance, Trend,
};
pub use engine::{AssessmentEngine, AssessmentSummary, RunOptions};
