//! Lifecycle event dispatch
//!
//! Observers implement only the callbacks they care about; every method of
//! [`Observer`] defaults to a no-op. The engine publishes each event to all
//! subscribed observers synchronously, in subscription order.
//!
//! Guarantees per run: one suite start/finish pair, one phase start/finish
//! pair per declared phase in declaration order, one flow start/finish pair
//! per spawned flow, and one request event per completed request.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::flow::FlowRecord;
use crate::request::RequestRecord;
use crate::suite::definition::PhaseDefinition;

/// Suite-level information passed with suite start and finish.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteInfo {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Suite display name
    pub name: String,
    /// Number of declared phases
    pub phase_count: usize,
    /// When the suite started
    pub started_at: DateTime<Utc>,
    /// When the suite finished (set on finish)
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall time from start to finish (set on finish)
    pub elapsed: Option<Duration>,
}

/// Subscriber to suite lifecycle events.
#[allow(unused_variables)]
pub trait Observer: Send + Sync {
    /// The suite is about to run its first phase.
    fn on_suite_start(&self, suite: &SuiteInfo) {}

    /// All phases ran and the shutdown wait ended.
    fn on_suite_finish(&self, suite: &SuiteInfo) {}

    /// A phase is starting.
    fn on_phase_start(&self, phase: &PhaseDefinition) {}

    /// A phase's ramp finished and all its flows were spawned.
    fn on_phase_finish(&self, phase: &PhaseDefinition) {}

    /// A flow finished setup and started its timed body.
    fn on_flow_start(&self, flow: &FlowRecord, phase: &PhaseDefinition) {}

    /// A flow's timed body returned.
    fn on_flow_finish(&self, flow: &FlowRecord, phase: &PhaseDefinition) {}

    /// A request issued by a flow completed.
    fn on_request(&self, request: &RequestRecord) {}
}

/// Fan-out of lifecycle events to subscribed observers.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl EventBus {
    /// Creates a bus with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer; it receives every event published afterwards.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Number of subscribed observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn each(&self, f: impl Fn(&dyn Observer)) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            f(observer.as_ref());
        }
    }

    /// Publishes suite start.
    pub fn publish_suite_start(&self, suite: &SuiteInfo) {
        self.each(|o| o.on_suite_start(suite));
    }

    /// Publishes suite finish.
    pub fn publish_suite_finish(&self, suite: &SuiteInfo) {
        self.each(|o| o.on_suite_finish(suite));
    }

    /// Publishes phase start.
    pub fn publish_phase_start(&self, phase: &PhaseDefinition) {
        self.each(|o| o.on_phase_start(phase));
    }

    /// Publishes phase finish.
    pub fn publish_phase_finish(&self, phase: &PhaseDefinition) {
        self.each(|o| o.on_phase_finish(phase));
    }

    /// Publishes flow start.
    pub fn publish_flow_start(&self, flow: &FlowRecord, phase: &PhaseDefinition) {
        self.each(|o| o.on_flow_start(flow, phase));
    }

    /// Publishes flow finish.
    pub fn publish_flow_finish(&self, flow: &FlowRecord, phase: &PhaseDefinition) {
        self.each(|o| o.on_flow_finish(flow, phase));
    }

    /// Publishes a completed request.
    pub fn publish_request(&self, request: &RequestRecord) {
        self.each(|o| o.on_request(request));
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}
