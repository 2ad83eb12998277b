//! Declarative HTTP flows
//!
//! An [`HttpFlow`] issues a fixed list of HTTP requests: the `setup` list
//! untimed before the flow starts, then the `steps` list as the timed body.
//! Every response status counts as a completed request; a transport error
//! (timeout, refused connection, unreadable body) ends the flow, since
//! later steps usually depend on earlier ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};

use crate::config::schema::{HttpBodyConfig, HttpFlowConfig, HttpStepConfig};
use crate::error::{ConfigError, FlowError};
use crate::flow::{FlowContext, FlowFactory, UserFlow};
use crate::http::request::{HttpBody, HttpParams, HttpRequest, HttpRequestOptions};
use crate::suite::definition::PhaseDefinition;

/// One request of a declarative flow.
#[derive(Debug, Clone)]
pub struct HttpStep {
    /// Request name
    pub name: String,
    /// Group tags
    pub groups: Vec<String>,
    /// What to send
    pub options: HttpRequestOptions,
}

impl HttpStep {
    /// Resolves a configured step.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the method is not a valid
    /// HTTP method token.
    pub fn from_config(path: &str, config: &HttpStepConfig) -> Result<Self, ConfigError> {
        let method = Method::from_bytes(config.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidValue {
                field: format!("{path}.method"),
                value: config.method.clone(),
                expected: "an HTTP method".to_string(),
            })?;

        Ok(Self {
            name: config.name.clone(),
            groups: config.groups.clone(),
            options: HttpRequestOptions {
                method,
                url: config.url.clone(),
                headers: config
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                body: config.body.as_ref().map(|body| match body {
                    HttpBodyConfig::Text(text) => HttpBody::Text(text.clone()),
                    HttpBodyConfig::Json(value) => HttpBody::Json(value.clone()),
                }),
                timeout: config.timeout_ms.map(Duration::from_millis),
            },
        })
    }
}

/// A named list of setup requests and timed steps.
#[derive(Debug, Clone)]
pub struct HttpFlowSpec {
    /// Flow type name
    pub name: String,
    /// Untimed requests issued during setup
    pub setup: Vec<HttpStep>,
    /// Timed requests
    pub steps: Vec<HttpStep>,
}

impl HttpFlowSpec {
    /// Resolves a configured flow.
    ///
    /// # Errors
    ///
    /// See [`HttpStep::from_config`].
    pub fn from_config(name: &str, config: &HttpFlowConfig) -> Result<Self, ConfigError> {
        let resolve = |section: &str, steps: &[HttpStepConfig]| {
            steps
                .iter()
                .enumerate()
                .map(|(i, step)| {
                    HttpStep::from_config(&format!("http_flows.{name}.{section}[{i}]"), step)
                })
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            name: name.to_string(),
            setup: resolve("setup", &config.setup)?,
            steps: resolve("steps", &config.steps)?,
        })
    }
}

/// Creates [`HttpFlow`]s sharing one spec and one client.
#[derive(Debug, Clone)]
pub struct HttpFlowFactory {
    spec: Arc<HttpFlowSpec>,
    client: Client,
}

impl HttpFlowFactory {
    /// Creates a factory for `spec`.
    #[must_use]
    pub fn new(spec: HttpFlowSpec, client: Client) -> Self {
        Self {
            spec: Arc::new(spec),
            client,
        }
    }
}

impl FlowFactory for HttpFlowFactory {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn create(&self, _phase: &Arc<PhaseDefinition>) -> Box<dyn UserFlow> {
        Box::new(HttpFlow {
            spec: Arc::clone(&self.spec),
            client: self.client.clone(),
        })
    }
}

/// One execution of a declarative HTTP flow.
#[derive(Debug)]
pub struct HttpFlow {
    spec: Arc<HttpFlowSpec>,
    client: Client,
}

impl HttpFlow {
    async fn issue(&self, ctx: &mut FlowContext, steps: &[HttpStep]) -> Result<(), FlowError> {
        for step in steps {
            let execution = ctx
                .run_request::<HttpRequest>(
                    &step.name,
                    step.groups.clone(),
                    HttpParams {
                        client: self.client.clone(),
                        options: step.options.clone(),
                    },
                )
                .await;

            if let Some(result) = execution.result().filter(|r| r.is_error()) {
                return Err(FlowError::Request {
                    name: step.name.clone(),
                    result: result.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserFlow for HttpFlow {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn setup(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let spec = Arc::clone(&self.spec);
        self.issue(ctx, &spec.setup).await
    }

    async fn run(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let spec = Arc::clone(&self.spec);
        self.issue(ctx, &spec.steps).await
    }
}
