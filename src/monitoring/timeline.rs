//! Run Timeline
//!
//! Records when each phase of a run starts and ends, for the summary
//! printed once the run is over.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Phases of a workflow run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Validate,
    Import,
    Upload,
    Bind,
    Invoke,
    Wait,
    Download,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validate => "validate",
            Phase::Import => "import",
            Phase::Upload => "upload",
            Phase::Bind => "bind",
            Phase::Invoke => "invoke",
            Phase::Wait => "wait",
            Phase::Download => "download",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Type of timeline event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    Started,
    Completed,
    /// Phase had nothing to do (e.g. restored from a checkpoint)
    Skipped,
    Failed,
}

/// A single event in the run timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub phase: Phase,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// Tracks the phases of a run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn add_event(&mut self, phase: Phase, event_type: EventType) {
        self.events.push(TimelineEvent {
            phase,
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Durations of phases that started and then completed or failed.
    pub fn get_durations(&self) -> HashMap<Phase, Duration> {
        let mut starts: HashMap<Phase, Instant> = HashMap::new();
        let mut durations: HashMap<Phase, Duration> = HashMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    starts.insert(event.phase, event.timestamp);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = starts.get(&event.phase) {
                        durations.insert(event.phase, event.timestamp.duration_since(*start));
                    }
                }
                EventType::Skipped => {}
            }
        }

        durations
    }

    /// One line per phase, in the order phases were first seen.
    pub fn summary(&self) -> String {
        let durations = self.get_durations();
        let mut seen: Vec<Phase> = Vec::new();
        let mut last_event: HashMap<Phase, &EventType> = HashMap::new();

        for event in &self.events {
            if !seen.contains(&event.phase) {
                seen.push(event.phase);
            }
            last_event.insert(event.phase, &event.event_type);
        }

        let mut output = String::from("Run phases:\n");
        for phase in seen {
            let status = match last_event.get(&phase) {
                Some(EventType::Skipped) => "skipped (checkpoint)".to_string(),
                Some(EventType::Failed) => "failed".to_string(),
                Some(EventType::Started) => "interrupted".to_string(),
                _ => durations
                    .get(&phase)
                    .map(|d| format!("{:.2?}", d))
                    .unwrap_or_default(),
            };
            output.push_str(&format!("  {:10} {}\n", phase.to_string(), status));
        }
        output.push_str(&format!("Total: {:.2?}\n", self.elapsed()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}
