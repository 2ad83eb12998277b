//! Phase loop
//!
//! A [`PhaseRunner`] drives one phase: it polls its ramp every
//! [`POLL_INTERVAL`], keeps a running total of owed flow starts, and spawns
//! flows through a [`FlowSpawner`] until the started count catches up with
//! the truncated total. The phase ends once the ramp reports finished; the
//! flows it spawned keep running after that.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::PhaseError;
use crate::events::EventBus;
use crate::observability::metrics;
use crate::suite::definition::{FlowDefinition, PhaseDefinition};
use crate::suite::ramp::{Clock, Ramp};
use crate::suite::selector::FlowSelector;

/// How often the phase loop polls its ramp.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Starts flows on behalf of a phase.
///
/// The engine implements this by registering the flow as in flight and
/// handing it to the runtime. Implementations must not wait for the flow.
pub trait FlowSpawner: Send + Sync {
    /// Starts one execution of `flow` in `phase`.
    fn spawn(&self, flow: &Arc<FlowDefinition>, phase: &Arc<PhaseDefinition>);
}

/// What a finished phase loop did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseOutcome {
    /// Phase name
    pub phase: String,
    /// Flows spawned during the phase
    pub spawned: u64,
    /// Spawn count per flow type
    pub by_flow: BTreeMap<String, u64>,
}

/// Runs a single phase.
#[derive(Debug)]
pub struct PhaseRunner {
    phase: Arc<PhaseDefinition>,
    ramp: Ramp,
    selector: Option<FlowSelector>,
}

impl PhaseRunner {
    /// Validates the phase and builds its ramp and selector.
    ///
    /// A phase whose rates are all zero may have no eligible flows; it then
    /// runs for its duration without spawning anything.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::InvalidRamp` for unusable rates or duration,
    /// `PhaseError::NoEligibleFlows` if the phase can spawn but no flow may
    /// run in it, and `PhaseError::InvalidWeights` if the eligible weights
    /// sum to zero.
    pub fn prepare(
        phase: Arc<PhaseDefinition>,
        eligible: &[Arc<FlowDefinition>],
    ) -> Result<Self, PhaseError> {
        let ramp = Ramp::new(
            &phase.name,
            phase.duration_secs,
            phase.flow_rate,
            phase.ramp_to,
            0,
        )?;

        let selector = if eligible.is_empty() && !phase.can_spawn() {
            None
        } else {
            Some(FlowSelector::new(&phase.name, eligible)?)
        };

        Ok(Self {
            phase,
            ramp,
            selector,
        })
    }

    /// Runs the phase loop to completion.
    ///
    /// Publishes phase start before the first poll and phase finish after
    /// the ramp has finished and every owed flow was spawned.
    #[allow(clippy::cast_precision_loss)]
    pub async fn run<R>(
        self,
        clock: &dyn Clock,
        rng: &mut R,
        spawner: &dyn FlowSpawner,
        bus: &EventBus,
    ) -> PhaseOutcome
    where
        R: Rng + Send + ?Sized,
    {
        let Self {
            phase,
            ramp,
            selector,
        } = self;
        let mut ramp = ramp.anchored_at(clock.now_second());

        info!(
            phase = %phase.name,
            duration_secs = phase.duration_secs,
            flow_rate = phase.flow_rate,
            ramp_to = ?phase.ramp_to,
            "phase started"
        );
        metrics::record_phase_transition(&phase.name);
        bus.publish_phase_start(&phase);

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut expected = 0.0_f64;
        let mut started: u64 = 0;
        let mut by_flow: BTreeMap<String, u64> = BTreeMap::new();

        loop {
            interval.tick().await;
            expected += ramp.count_for_current_second(clock);

            while (started as f64) < expected.trunc() {
                let Some(selector) = &selector else {
                    break;
                };
                let flow = selector.select(rng);
                spawner.spawn(flow, &phase);
                *by_flow.entry(flow.name().to_string()).or_default() += 1;
                started += 1;
            }

            if ramp.finished() {
                break;
            }
        }

        debug!(phase = %phase.name, spawned = started, "phase loop finished");
        bus.publish_phase_finish(&phase);

        PhaseOutcome {
            phase: phase.name.clone(),
            spawned: started,
            by_flow,
        }
    }
}
