//! Suite orchestration
//!
//! The [`SuiteEngine`] runs phases strictly in declaration order, spawns
//! every flow as an independent task, and tracks those tasks in a set that
//! spans all phases. After the last phase it waits for the set to drain,
//! bounded by the suite's finish timeout. Flows still running when the
//! timeout expires are left detached; they are never aborted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PhaseError;
use crate::events::{EventBus, Observer, SuiteInfo};
use crate::flow::{FlowContext, FlowExecution, FlowId};
use crate::observability::metrics;
use crate::suite::definition::{FlowDefinition, PhaseDefinition, SuiteDefinition};
use crate::suite::ids::IdGenerator;
use crate::suite::phase::{FlowSpawner, PhaseOutcome, PhaseRunner};
use crate::suite::ramp::{Clock, SystemClock};

// ============================================================================
// In-flight tracking
// ============================================================================

/// Flows currently executing, keyed by id, with the phase they started in.
#[derive(Debug, Default)]
struct InFlight {
    flows: DashMap<FlowId, String>,
    phases_complete: AtomicBool,
    drained: Notify,
}

impl InFlight {
    fn insert(&self, id: FlowId, phase: &str) {
        self.flows.insert(id, phase.to_string());
        metrics::set_flows_in_flight(self.flows.len());
    }

    fn remove(&self, id: FlowId) {
        self.flows.remove(&id);
        metrics::set_flows_in_flight(self.flows.len());
        if self.phases_complete.load(Ordering::SeqCst) && self.flows.is_empty() {
            self.drained.notify_one();
        }
    }

    fn len(&self) -> usize {
        self.flows.len()
    }

    fn mark_phases_complete(&self) {
        self.phases_complete.store(true, Ordering::SeqCst);
    }

    /// Resolves once no flows remain.
    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.flows.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Outstanding flow count per phase.
    fn by_phase(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.flows {
            *counts.entry(entry.value().clone()).or_default() += 1;
        }
        counts
    }
}

/// Removes a flow from the in-flight set on every exit path.
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    id: FlowId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(self.id);
    }
}

// ============================================================================
// Flow spawning
// ============================================================================

/// Spawns each flow as a detached tokio task.
struct TaskSpawner {
    bus: Arc<EventBus>,
    ids: Arc<IdGenerator>,
    in_flight: Arc<InFlight>,
    failed: Arc<AtomicU64>,
}

impl FlowSpawner for TaskSpawner {
    fn spawn(&self, flow: &Arc<FlowDefinition>, phase: &Arc<PhaseDefinition>) {
        let id = self.ids.next_flow();
        self.in_flight.insert(id, &phase.name);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            id,
        };

        let user_flow = flow.factory.create(phase);
        let ctx = FlowContext::new(
            id,
            Arc::clone(phase),
            Arc::clone(&self.bus),
            Arc::clone(&self.ids),
        );
        let failed = Arc::clone(&self.failed);

        debug!(flow_id = id, flow = %flow.name(), phase = %phase.name, "spawning flow");

        // Dropping the handle detaches the task.
        tokio::spawn(async move {
            let _guard = guard;
            let record = FlowExecution::new(user_flow, ctx).exec().await;
            if record.failed() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}

// ============================================================================
// Suite report
// ============================================================================

/// Summary of a finished suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Unique id of the run
    pub run_id: Uuid,
    /// Suite display name
    pub name: String,
    /// When the suite started
    pub started_at: DateTime<Utc>,
    /// When the suite finished
    pub finished_at: DateTime<Utc>,
    /// Wall time of the run, including the shutdown wait
    pub elapsed: Duration,
    /// Per-phase spawn results, in execution order
    pub phases: Vec<PhaseOutcome>,
    /// Total spawn count per flow type
    pub spawned_by_flow: BTreeMap<String, u64>,
    /// Flows still running when the engine returned
    pub orphaned: usize,
    /// Flows that finished with an error by the time the engine returned
    pub failed_flows: u64,
    /// Whether the shutdown wait hit the finish timeout
    pub timed_out: bool,
}

impl SuiteReport {
    /// Total number of flows spawned across all phases.
    #[must_use]
    pub fn total_spawned(&self) -> u64 {
        self.phases.iter().map(|p| p.spawned).sum()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Runs a suite definition.
///
/// Observers subscribe through [`SuiteEngine::subscribe`] before
/// [`SuiteEngine::run`] is called.
pub struct SuiteEngine {
    definition: SuiteDefinition,
    bus: Arc<EventBus>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl SuiteEngine {
    /// Creates an engine using the wall clock.
    #[must_use]
    pub fn new(definition: SuiteDefinition) -> Self {
        Self {
            definition,
            bus: Arc::new(EventBus::new()),
            ids: Arc::new(IdGenerator::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used by phase ramps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The bus lifecycle events are published on.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Subscribes an observer to this run's events.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.bus.subscribe(observer);
    }

    /// Runs every phase, then waits for outstanding flows.
    ///
    /// All phases are validated before the suite start event, so a bad
    /// phase never produces a partial run.
    ///
    /// # Errors
    ///
    /// Returns a `PhaseError` if any phase has an invalid ramp, no eligible
    /// flows despite a nonzero rate, or a zero total weight.
    pub async fn run(self) -> Result<SuiteReport, PhaseError> {
        let runners = self
            .definition
            .phases
            .iter()
            .map(|phase| {
                PhaseRunner::prepare(
                    Arc::clone(phase),
                    &self.definition.eligible_flows(&phase.name),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rng = self
            .definition
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        let mut suite = SuiteInfo {
            run_id: Uuid::new_v4(),
            name: self.definition.display_name().to_string(),
            phase_count: runners.len(),
            started_at: Utc::now(),
            finished_at: None,
            elapsed: None,
        };
        let start = Instant::now();

        info!(
            run_id = %suite.run_id,
            suite = %suite.name,
            phases = suite.phase_count,
            flows = self.definition.flows.len(),
            seed = ?self.definition.seed,
            "suite started"
        );
        self.bus.publish_suite_start(&suite);

        let in_flight = Arc::new(InFlight::default());
        let failed = Arc::new(AtomicU64::new(0));
        let spawner = TaskSpawner {
            bus: Arc::clone(&self.bus),
            ids: Arc::clone(&self.ids),
            in_flight: Arc::clone(&in_flight),
            failed: Arc::clone(&failed),
        };

        let mut phases = Vec::with_capacity(runners.len());
        for runner in runners {
            let outcome = runner
                .run(self.clock.as_ref(), &mut rng, &spawner, &self.bus)
                .await;
            phases.push(outcome);
        }
        in_flight.mark_phases_complete();

        let timed_out = self.wait_for_flows(&in_flight).await;
        let orphaned = in_flight.len();

        let finished_at = Utc::now();
        let elapsed = start.elapsed();
        suite.finished_at = Some(finished_at);
        suite.elapsed = Some(elapsed);

        let mut spawned_by_flow: BTreeMap<String, u64> = BTreeMap::new();
        for phase in &phases {
            for (flow, count) in &phase.by_flow {
                *spawned_by_flow.entry(flow.clone()).or_default() += count;
            }
        }

        let report = SuiteReport {
            run_id: suite.run_id,
            name: suite.name.clone(),
            started_at: suite.started_at,
            finished_at,
            elapsed,
            phases,
            spawned_by_flow,
            orphaned,
            failed_flows: failed.load(Ordering::Relaxed),
            timed_out,
        };

        info!(
            run_id = %report.run_id,
            spawned = report.total_spawned(),
            failed = report.failed_flows,
            orphaned,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "suite finished"
        );
        self.bus.publish_suite_finish(&suite);

        Ok(report)
    }

    /// Waits for outstanding flows; returns `true` if the timeout expired.
    async fn wait_for_flows(&self, in_flight: &InFlight) -> bool {
        let outstanding = in_flight.len();
        if outstanding == 0 {
            return false;
        }

        let timeout = self.definition.finish_timeout;
        debug!(outstanding, ?timeout, "waiting for in-flight flows");

        if tokio::time::timeout(timeout, in_flight.wait_drained())
            .await
            .is_ok()
        {
            return false;
        }

        warn!(
            outstanding = in_flight.len(),
            by_phase = ?in_flight.by_phase(),
            ?timeout,
            "finish timeout elapsed with flows still running; leaving them detached"
        );
        true
    }
}

impl std::fmt::Debug for SuiteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteEngine")
            .field("suite", &self.definition.display_name())
            .field("phases", &self.definition.phases.len())
            .field("flows", &self.definition.flows.len())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}
