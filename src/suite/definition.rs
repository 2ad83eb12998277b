//! Resolved suite definitions
//!
//! These are the runtime forms of a suite: phase names are assigned, flow
//! references are resolved to factories, and the shutdown bound is a
//! concrete [`Duration`]. Suite files are turned into these by
//! [`FlowRegistry::build_suite`](crate::config::FlowRegistry::build_suite).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::schema::PhaseConfig;
use crate::flow::FlowFactory;

/// Default wait for outstanding flows after the last phase.
pub const DEFAULT_FINISH_TIMEOUT: Duration = Duration::from_millis(10_000);

/// One time-bounded phase of a suite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseDefinition {
    /// Position in the suite (execution order)
    pub index: usize,
    /// Phase name, `Phase <index>` when none was given
    pub name: String,
    /// Phase length in seconds
    pub duration_secs: u64,
    /// New flows per second at phase start
    pub flow_rate: f64,
    /// New flows per second at phase end; `None` keeps the rate constant
    pub ramp_to: Option<f64>,
}

impl PhaseDefinition {
    /// Creates a phase definition.
    #[must_use]
    pub fn new(
        index: usize,
        name: impl Into<String>,
        duration_secs: u64,
        flow_rate: f64,
        ramp_to: Option<f64>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            duration_secs,
            flow_rate,
            ramp_to,
        }
    }

    /// Resolves a configured phase, assigning `Phase <index>` if unnamed.
    #[must_use]
    pub fn from_config(index: usize, config: &PhaseConfig) -> Self {
        Self::new(
            index,
            config
                .name
                .clone()
                .unwrap_or_else(|| default_phase_name(index)),
            config.duration,
            config.flow_rate,
            config.ramp_to,
        )
    }

    /// Whether the ramp can ever ask for a flow start.
    #[must_use]
    pub fn can_spawn(&self) -> bool {
        self.flow_rate > 0.0 || self.ramp_to.is_some_and(|to| to > 0.0)
    }
}

/// Name given to a phase declared without one.
#[must_use]
pub fn default_phase_name(index: usize) -> String {
    format!("Phase {index}")
}

/// A weighted flow type a suite may spawn.
#[derive(Clone)]
pub struct FlowDefinition {
    /// Creates flow instances
    pub factory: Arc<dyn FlowFactory>,
    /// Relative selection weight
    pub weight: u32,
    /// Phases this flow may run in; `None` means every phase
    pub phases: Option<Vec<String>>,
}

impl FlowDefinition {
    /// Creates a flow definition eligible in every phase.
    #[must_use]
    pub fn new(factory: Arc<dyn FlowFactory>, weight: u32) -> Self {
        Self {
            factory,
            weight,
            phases: None,
        }
    }

    /// Restricts the flow to the named phases.
    #[must_use]
    pub fn in_phases<I, S>(mut self, phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phases = Some(phases.into_iter().map(Into::into).collect());
        self
    }

    /// Flow type name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.factory.name()
    }

    /// Whether this flow may be spawned during `phase`.
    #[must_use]
    pub fn runs_in(&self, phase: &str) -> bool {
        self.phases
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == phase))
    }
}

impl std::fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowDefinition")
            .field("flow", &self.factory.name())
            .field("weight", &self.weight)
            .field("phases", &self.phases)
            .finish()
    }
}

/// A complete suite: ordered phases plus the weighted flow catalog.
#[derive(Debug, Clone)]
pub struct SuiteDefinition {
    /// Display name
    pub name: Option<String>,
    /// Phases in execution order
    pub phases: Vec<Arc<PhaseDefinition>>,
    /// Flow catalog
    pub flows: Vec<Arc<FlowDefinition>>,
    /// How long to wait for outstanding flows after the last phase
    pub finish_timeout: Duration,
    /// Seed for flow selection; random when `None`
    pub seed: Option<u64>,
}

impl SuiteDefinition {
    /// Starts building a suite.
    #[must_use]
    pub fn builder() -> SuiteBuilder {
        SuiteBuilder::default()
    }

    /// Display name, or `"unnamed"`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Flows eligible in `phase`, in catalog order.
    #[must_use]
    pub fn eligible_flows(&self, phase: &str) -> Vec<Arc<FlowDefinition>> {
        self.flows
            .iter()
            .filter(|f| f.runs_in(phase))
            .cloned()
            .collect()
    }
}

/// Builder for [`SuiteDefinition`].
#[derive(Debug, Default)]
pub struct SuiteBuilder {
    name: Option<String>,
    phases: Vec<PhaseConfig>,
    flows: Vec<FlowDefinition>,
    finish_timeout: Option<Duration>,
    seed: Option<u64>,
}

impl SuiteBuilder {
    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a phase.
    #[must_use]
    pub fn phase(mut self, phase: PhaseConfig) -> Self {
        self.phases.push(phase);
        self
    }

    /// Adds a flow to the catalog.
    #[must_use]
    pub fn flow(mut self, flow: FlowDefinition) -> Self {
        self.flows.push(flow);
        self
    }

    /// Sets the shutdown wait bound.
    #[must_use]
    pub const fn finish_timeout(mut self, timeout: Duration) -> Self {
        self.finish_timeout = Some(timeout);
        self
    }

    /// Seeds flow selection.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Resolves phase names and freezes the definition.
    #[must_use]
    pub fn build(self) -> SuiteDefinition {
        SuiteDefinition {
            name: self.name,
            phases: self
                .phases
                .iter()
                .enumerate()
                .map(|(i, p)| Arc::new(PhaseDefinition::from_config(i, p)))
                .collect(),
            flows: self.flows.into_iter().map(Arc::new).collect(),
            finish_timeout: self.finish_timeout.unwrap_or(DEFAULT_FINISH_TIMEOUT),
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_support::NoopFlow;

    #[test]
    fn test_unnamed_phases_get_index_names() {
        let suite = SuiteDefinition::builder()
            .phase(PhaseConfig::new(10, 1.0))
            .phase(PhaseConfig::new(10, 2.0).named("Sustain"))
            .phase(PhaseConfig::new(10, 2.0))
            .build();

        let names: Vec<&str> = suite.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Phase 0", "Sustain", "Phase 2"]);
        assert_eq!(suite.phases[2].index, 2);
    }

    #[test]
    fn test_default_finish_timeout() {
        let suite = SuiteDefinition::builder().build();
        assert_eq!(suite.finish_timeout, Duration::from_secs(10));
        assert_eq!(suite.display_name(), "unnamed");
    }

    #[test]
    fn test_flow_phase_restriction() {
        let anywhere = FlowDefinition::new(NoopFlow::factory("a"), 1);
        let restricted = FlowDefinition::new(NoopFlow::factory("b"), 1).in_phases(["Sustain"]);

        assert!(anywhere.runs_in("Ramp Up"));
        assert!(restricted.runs_in("Sustain"));
        assert!(!restricted.runs_in("Ramp Up"));

        let suite = SuiteDefinition::builder()
            .flow(anywhere)
            .flow(restricted)
            .build();
        let eligible: Vec<String> = suite
            .eligible_flows("Ramp Up")
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(eligible, vec!["a".to_string()]);
    }

    #[test]
    fn test_can_spawn() {
        assert!(PhaseDefinition::new(0, "p", 1, 0.5, None).can_spawn());
        assert!(PhaseDefinition::new(0, "p", 1, 0.0, Some(3.0)).can_spawn());
        assert!(!PhaseDefinition::new(0, "p", 1, 0.0, None).can_spawn());
        assert!(!PhaseDefinition::new(0, "p", 1, 0.0, Some(0.0)).can_spawn());
    }
}
