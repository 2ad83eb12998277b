//! Flow type registry
//!
//! Suite files reference flow types by name. The registry maps those names
//! to factories: declarative `http_flows` are registered from the file
//! itself, and library users register native flows in code before
//! building the suite.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::schema::SuiteConfig;
use crate::error::ConfigError;
use crate::flow::FlowFactory;
use crate::http::{HttpFlowFactory, HttpFlowSpec};
use crate::suite::definition::{FlowDefinition, SuiteDefinition};

/// Largest edit distance offered as a "did you mean" suggestion.
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Name → factory map used to resolve suite file flow references.
#[derive(Default, Clone)]
pub struct FlowRegistry {
    factories: BTreeMap<String, Arc<dyn FlowFactory>>,
}

impl FlowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under its own name, replacing any previous one.
    pub fn register(&mut self, factory: Arc<dyn FlowFactory>) -> &mut Self {
        let name = factory.name().to_string();
        if self.factories.insert(name.clone(), factory).is_some() {
            debug!(flow = %name, "replaced registered flow type");
        }
        self
    }

    /// Registers every declarative HTTP flow of `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a flow has an invalid step.
    pub fn register_http_flows(
        &mut self,
        config: &SuiteConfig,
        client: &Client,
    ) -> Result<&mut Self, ConfigError> {
        for (name, flow) in &config.http_flows {
            let spec = HttpFlowSpec::from_config(name, flow)?;
            self.register(Arc::new(HttpFlowFactory::new(spec, client.clone())));
        }
        Ok(self)
    }

    /// Looks up a factory by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn FlowFactory>> {
        self.factories.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Looks up a factory, suggesting the closest name on a miss.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownFlow` if no factory is registered
    /// under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn FlowFactory>, ConfigError> {
        self.get(name).cloned().ok_or_else(|| ConfigError::UnknownFlow {
            name: name.to_string(),
            suggestion: self.suggest(name),
        })
    }

    fn suggest(&self, name: &str) -> Option<String> {
        self.names()
            .map(|candidate| (candidate, strsim::damerau_levenshtein(name, candidate)))
            .filter(|(_, dist)| *dist <= MAX_SUGGESTION_DISTANCE)
            .min_by_key(|(_, dist)| *dist)
            .map(|(candidate, _)| candidate.to_string())
    }

    /// Builds a runnable suite from a validated config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownFlow` for the first flow entry whose
    /// type is not registered.
    pub fn build_suite(&self, config: &SuiteConfig) -> Result<SuiteDefinition, ConfigError> {
        let mut builder = SuiteDefinition::builder();

        if let Some(name) = &config.name {
            builder = builder.name(name.clone());
        }
        if let Some(ms) = config.finish_timeout_ms {
            builder = builder.finish_timeout(Duration::from_millis(ms));
        }
        if let Some(seed) = config.seed {
            builder = builder.seed(seed);
        }
        for phase in &config.phases {
            builder = builder.phase(phase.clone());
        }
        for entry in &config.flows {
            let mut flow = FlowDefinition::new(self.resolve(&entry.flow)?, entry.weight);
            if let Some(phases) = &entry.phases {
                flow = flow.in_phases(phases.iter().cloned());
            }
            builder = builder.flow(flow);
        }

        Ok(builder.build())
    }
}

impl std::fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("flows", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
