//! Suite validation
//!
//! Runs on the deserialized [`SuiteConfig`] and collects every problem
//! instead of stopping at the first, so that a single `flowgen validate`
//! reports everything wrong with a file.

use std::collections::HashSet;

use crate::config::loader::ConfigLimits;
use crate::config::schema::{HttpFlowConfig, HttpStepConfig, PhaseConfig, SuiteConfig};
use crate::error::{Severity, ValidationIssue};
use crate::suite::definition::default_phase_name;

// ============================================================================
// Public API
// ============================================================================

/// Result of suite validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Suite validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a suite and returns all issues found.
    pub fn validate(&mut self, config: &SuiteConfig, limits: &ConfigLimits) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        if config.name.as_deref().is_some_and(str::is_empty) {
            self.add_warning("name", "suite name is empty");
        }
        if config.finish_timeout_ms == Some(0) {
            self.add_warning(
                "finish_timeout_ms",
                "finish timeout of zero leaves every outstanding flow detached",
            );
        }

        let phase_names = self.validate_phases(&config.phases, limits);
        self.validate_flows(config, &phase_names, limits);
        self.validate_eligibility(config, &phase_names);

        for (name, flow) in &config.http_flows {
            self.validate_http_flow(name, flow, limits);
        }

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Phases
    // ========================================================================

    /// Validates phases and returns their resolved names.
    fn validate_phases(&mut self, phases: &[PhaseConfig], limits: &ConfigLimits) -> Vec<String> {
        if phases.is_empty() {
            self.add_warning("phases", "suite has no phases and will spawn nothing");
        }
        if phases.len() > limits.max_phases {
            self.add_error(
                "phases",
                &format!(
                    "too many phases: {} (limit {})",
                    phases.len(),
                    limits.max_phases
                ),
            );
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(phases.len());

        for (i, phase) in phases.iter().enumerate() {
            let path = format!("phases[{i}]");

            if phase.duration == 0 {
                self.add_error(
                    &format!("{path}.duration"),
                    "duration must be greater than zero",
                );
            } else if phase.duration > limits.max_phase_duration {
                self.add_error(
                    &format!("{path}.duration"),
                    &format!(
                        "duration {}s exceeds the limit of {}s",
                        phase.duration, limits.max_phase_duration
                    ),
                );
            }

            self.check_rate(&format!("{path}.flow_rate"), phase.flow_rate);
            if let Some(to) = phase.ramp_to {
                self.check_rate(&format!("{path}.ramp_to"), to);
                if (to - phase.flow_rate).abs() < f64::EPSILON {
                    self.add_warning(
                        &format!("{path}.ramp_to"),
                        "ramp_to equals flow_rate; the phase behaves as constant rate",
                    );
                }
            }

            let name = phase.name.clone().unwrap_or_else(|| default_phase_name(i));
            if name.is_empty() {
                self.add_error(&format!("{path}.name"), "phase name cannot be empty");
            } else if !seen.insert(name.clone()) {
                self.add_error(
                    &format!("{path}.name"),
                    &format!("duplicate phase name '{name}'"),
                );
            }
            names.push(name);
        }

        names
    }

    fn check_rate(&mut self, path: &str, rate: f64) {
        if !rate.is_finite() || rate < 0.0 {
            self.add_error(path, "rate must be a non-negative number");
        }
    }

    // ========================================================================
    // Flow catalog
    // ========================================================================

    fn validate_flows(&mut self, config: &SuiteConfig, phase_names: &[String], limits: &ConfigLimits) {
        if config.flows.len() > limits.max_flows {
            self.add_error(
                "flows",
                &format!(
                    "too many flows: {} (limit {})",
                    config.flows.len(),
                    limits.max_flows
                ),
            );
        }

        for (i, entry) in config.flows.iter().enumerate() {
            let path = format!("flows[{i}]");

            if entry.flow.is_empty() {
                self.add_error(&format!("{path}.flow"), "flow type name cannot be empty");
            }
            if entry.weight == 0 {
                self.add_error(
                    &format!("{path}.weight"),
                    "weight must be greater than zero",
                );
            }

            if let Some(phases) = &entry.phases {
                if phases.is_empty() {
                    self.add_warning(
                        &format!("{path}.phases"),
                        "empty phase list; this flow never runs",
                    );
                }
                for (j, phase) in phases.iter().enumerate() {
                    if !phase_names.contains(phase) {
                        self.add_error(
                            &format!("{path}.phases[{j}]"),
                            &format!("unknown phase '{phase}'"),
                        );
                    }
                }
            }
        }
    }

    /// Reports phases that would spawn but have no flow allowed to run.
    fn validate_eligibility(&mut self, config: &SuiteConfig, phase_names: &[String]) {
        for (i, (phase, name)) in config.phases.iter().zip(phase_names).enumerate() {
            let can_spawn = phase.flow_rate > 0.0 || phase.ramp_to.is_some_and(|to| to > 0.0);
            if !can_spawn {
                continue;
            }

            let eligible = config.flows.iter().filter(|f| {
                f.weight > 0 && f.phases.as_ref().is_none_or(|p| p.contains(name))
            });
            if eligible.count() == 0 {
                self.add_error(
                    &format!("phases[{i}]"),
                    &format!("phase '{name}' has a nonzero flow rate but no eligible flows"),
                );
            }
        }
    }

    // ========================================================================
    // Declarative HTTP flows
    // ========================================================================

    fn validate_http_flow(&mut self, name: &str, flow: &HttpFlowConfig, limits: &ConfigLimits) {
        let path = format!("http_flows.{name}");

        if flow.steps.is_empty() {
            self.add_warning(&format!("{path}.steps"), "flow issues no timed requests");
        }
        let total = flow.setup.len() + flow.steps.len();
        if total > limits.max_http_steps {
            self.add_error(
                &path,
                &format!(
                    "too many requests: {total} (limit {})",
                    limits.max_http_steps
                ),
            );
        }

        for (i, step) in flow.setup.iter().enumerate() {
            self.validate_http_step(&format!("{path}.setup[{i}]"), step);
        }
        for (i, step) in flow.steps.iter().enumerate() {
            self.validate_http_step(&format!("{path}.steps[{i}]"), step);
        }
    }

    fn validate_http_step(&mut self, path: &str, step: &HttpStepConfig) {
        if step.name.is_empty() {
            self.add_error(&format!("{path}.name"), "request name cannot be empty");
        }
        if reqwest::Method::from_bytes(step.method.as_bytes()).is_err() {
            self.add_error(
                &format!("{path}.method"),
                &format!("invalid HTTP method '{}'", step.method),
            );
        }
        match reqwest::Url::parse(&step.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => self.add_error(
                &format!("{path}.url"),
                &format!("unsupported URL scheme '{}'", url.scheme()),
            ),
            Err(e) => self.add_error(&format!("{path}.url"), &format!("invalid URL: {e}")),
        }
        if step.timeout_ms == Some(0) {
            self.add_error(
                &format!("{path}.timeout_ms"),
                "timeout must be greater than zero",
            );
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}
