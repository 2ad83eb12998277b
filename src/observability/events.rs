//! JSONL lifecycle event stream
//!
//! [`EventWriter`] subscribes to the event bus and writes each lifecycle
//! event as one JSON line with a monotonically increasing sequence number,
//! so that external tools can post-process a run.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::events::{Observer, SuiteInfo};
use crate::flow::{FlowId, FlowOutcome, FlowRecord};
use crate::request::{RequestId, RequestRecord, RequestResult};
use crate::suite::definition::PhaseDefinition;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// Owned, serializable form of a lifecycle event.
///
/// Tagged with `"type"` so consumers can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The suite started.
    SuiteStarted {
        /// When the suite started
        timestamp: DateTime<Utc>,
        /// Run id
        run_id: Uuid,
        /// Suite name
        suite: String,
        /// Number of phases
        phase_count: usize,
    },

    /// The suite finished, including the shutdown wait.
    SuiteFinished {
        /// When the suite finished
        timestamp: DateTime<Utc>,
        /// Run id
        run_id: Uuid,
        /// Suite name
        suite: String,
        /// Run duration in milliseconds
        elapsed_ms: u64,
    },

    /// A phase started.
    PhaseStarted {
        /// When the phase started
        timestamp: DateTime<Utc>,
        /// Phase name
        phase: String,
        /// Position in the suite
        phase_index: usize,
        /// Phase length in seconds
        duration_secs: u64,
        /// Starting flow rate
        flow_rate: f64,
        /// Ending flow rate, if ramping
        ramp_to: Option<f64>,
    },

    /// A phase finished spawning.
    PhaseFinished {
        /// When the phase finished
        timestamp: DateTime<Utc>,
        /// Phase name
        phase: String,
        /// Position in the suite
        phase_index: usize,
    },

    /// A flow started its timed body.
    FlowStarted {
        /// Flow start time
        timestamp: DateTime<Utc>,
        /// Flow id
        flow_id: FlowId,
        /// Flow type
        flow: String,
        /// Phase name
        phase: String,
    },

    /// A flow finished.
    FlowFinished {
        /// Flow finish time
        timestamp: DateTime<Utc>,
        /// Flow id
        flow_id: FlowId,
        /// Flow type
        flow: String,
        /// Phase name
        phase: String,
        /// Number of requests issued
        requests: usize,
        /// How the flow ended
        outcome: Option<FlowOutcome>,
    },

    /// A request completed.
    RequestCompleted {
        /// Request finish time
        timestamp: DateTime<Utc>,
        /// Request id
        request_id: RequestId,
        /// Issuing flow
        flow_id: FlowId,
        /// Request name
        name: String,
        /// Group tags
        groups: Vec<String>,
        /// Phase name
        phase: String,
        /// Duration in milliseconds
        duration_ms: f64,
        /// Result classification
        result: RequestResult,
    },
}

impl Event {
    /// Suite start event.
    #[must_use]
    pub fn suite_started(suite: &SuiteInfo) -> Self {
        Self::SuiteStarted {
            timestamp: suite.started_at,
            run_id: suite.run_id,
            suite: suite.name.clone(),
            phase_count: suite.phase_count,
        }
    }

    /// Suite finish event.
    #[must_use]
    pub fn suite_finished(suite: &SuiteInfo) -> Self {
        Self::SuiteFinished {
            timestamp: suite.finished_at.unwrap_or_else(Utc::now),
            run_id: suite.run_id,
            suite: suite.name.clone(),
            elapsed_ms: suite
                .elapsed
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Phase start event.
    #[must_use]
    pub fn phase_started(phase: &PhaseDefinition) -> Self {
        Self::PhaseStarted {
            timestamp: Utc::now(),
            phase: phase.name.clone(),
            phase_index: phase.index,
            duration_secs: phase.duration_secs,
            flow_rate: phase.flow_rate,
            ramp_to: phase.ramp_to,
        }
    }

    /// Phase finish event.
    #[must_use]
    pub fn phase_finished(phase: &PhaseDefinition) -> Self {
        Self::PhaseFinished {
            timestamp: Utc::now(),
            phase: phase.name.clone(),
            phase_index: phase.index,
        }
    }

    /// Flow start event.
    #[must_use]
    pub fn flow_started(flow: &FlowRecord) -> Self {
        Self::FlowStarted {
            timestamp: flow.started_at.unwrap_or_else(Utc::now),
            flow_id: flow.id,
            flow: flow.name.clone(),
            phase: flow.phase.clone(),
        }
    }

    /// Flow finish event.
    #[must_use]
    pub fn flow_finished(flow: &FlowRecord) -> Self {
        Self::FlowFinished {
            timestamp: flow.finished_at.unwrap_or_else(Utc::now),
            flow_id: flow.id,
            flow: flow.name.clone(),
            phase: flow.phase.clone(),
            requests: flow.requests.len(),
            outcome: flow.outcome.clone(),
        }
    }

    /// Request completion event.
    #[must_use]
    pub fn request_completed(request: &RequestRecord) -> Self {
        Self::RequestCompleted {
            timestamp: request.finished_at.unwrap_or_else(Utc::now),
            request_id: request.id,
            flow_id: request.flow_id,
            name: request.name.clone(),
            groups: request.groups.clone(),
            phase: request.phase.clone(),
            duration_ms: request.duration_ms(),
            result: request.result.clone(),
        }
    }
}

/// Wire envelope adding the sequence number to each event.
#[derive(Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization and I/O failures are dropped; writing events never fails
/// a run.
pub struct EventWriter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWriter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventWriter {
    /// Creates a writer over any byte sink.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates (or truncates) `path` and writes events to it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Writes one event as a JSON line.
    pub fn emit(&self, event: Event) {
        let envelope = EventEnvelope {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
            }
        }
    }

    /// Flushes buffered lines to the sink.
    pub fn flush(&self) {
        if let Ok(mut w) = self.writer.lock() {
            let _ = w.flush();
        }
    }

    /// Number of events written so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Observer for EventWriter {
    fn on_suite_start(&self, suite: &SuiteInfo) {
        self.emit(Event::suite_started(suite));
    }

    fn on_suite_finish(&self, suite: &SuiteInfo) {
        self.emit(Event::suite_finished(suite));
        self.flush();
    }

    fn on_phase_start(&self, phase: &PhaseDefinition) {
        self.emit(Event::phase_started(phase));
    }

    fn on_phase_finish(&self, phase: &PhaseDefinition) {
        self.emit(Event::phase_finished(phase));
        self.flush();
    }

    fn on_flow_start(&self, flow: &FlowRecord, _phase: &PhaseDefinition) {
        self.emit(Event::flow_started(flow));
    }

    fn on_flow_finish(&self, flow: &FlowRecord, _phase: &PhaseDefinition) {
        self.emit(Event::flow_finished(flow));
    }

    fn on_request(&self, request: &RequestRecord) {
        self.emit(Event::request_completed(request));
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
