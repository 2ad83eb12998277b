//! Suite file schema
//!
//! These types are deserialized from YAML suite files. Field names are
//! `snake_case`; the `camelCase` spellings used by older suites are
//! accepted as aliases.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Top-Level Suite
// ============================================================================

/// Root of a suite file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Suite name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Wait for outstanding flows after the last phase, in milliseconds
    #[serde(
        default,
        alias = "finishTimeoutMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub finish_timeout_ms: Option<u64>,

    /// Seed for flow selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Phases in execution order
    pub phases: Vec<PhaseConfig>,

    /// Weighted flow catalog
    pub flows: Vec<FlowEntryConfig>,

    /// Declarative HTTP flow types, by name
    #[serde(
        default,
        alias = "httpFlows",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub http_flows: IndexMap<String, HttpFlowConfig>,
}

// ============================================================================
// Phases
// ============================================================================

/// One phase of a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    /// Phase name; `Phase <index>` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Phase length in seconds
    pub duration: u64,

    /// New flows per second at phase start
    #[serde(alias = "flowRate")]
    pub flow_rate: f64,

    /// New flows per second at phase end
    #[serde(default, alias = "rampTo", skip_serializing_if = "Option::is_none")]
    pub ramp_to: Option<f64>,
}

impl PhaseConfig {
    /// Creates an unnamed constant-rate phase.
    #[must_use]
    pub const fn new(duration: u64, flow_rate: f64) -> Self {
        Self {
            name: None,
            duration,
            flow_rate,
            ramp_to: None,
        }
    }

    /// Names the phase.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Ramps the rate linearly to `ramp_to` over the phase.
    #[must_use]
    pub const fn ramp_to(mut self, ramp_to: f64) -> Self {
        self.ramp_to = Some(ramp_to);
        self
    }
}

// ============================================================================
// Flow Catalog
// ============================================================================

/// A weighted reference to a flow type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowEntryConfig {
    /// Registered flow type name
    pub flow: String,

    /// Relative selection weight
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Phases the flow may run in; every phase when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<String>>,
}

const fn default_weight() -> u32 {
    1
}

// ============================================================================
// Declarative HTTP Flows
// ============================================================================

/// An HTTP flow type: untimed setup requests followed by timed steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpFlowConfig {
    /// Requests issued during setup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<HttpStepConfig>,

    /// Requests issued by the timed body, in order
    pub steps: Vec<HttpStepConfig>,
}

/// One HTTP request of a declarative flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpStepConfig {
    /// Request name used in reports
    pub name: String,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute target URL
    pub url: String,

    /// Group tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Request headers
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,

    /// Request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<HttpBodyConfig>,

    /// Per-request timeout in milliseconds
    #[serde(
        default,
        alias = "timeoutMs",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Request body: sent as-is when a string, as JSON otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HttpBodyConfig {
    /// Raw text body
    Text(String),
    /// Structured body, serialized as JSON
    Json(serde_json::Value),
}
