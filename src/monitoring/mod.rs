//! Monitoring Module
//!
//! Timing of workflow runs.
//!
//! - [`ExecutionTimeline`]: Phase start/end timing for the run summary

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, Phase, TimelineEvent};
