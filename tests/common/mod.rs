//! Shared integration-test helpers: flow types with controllable timing,
//! an observer that records the event timeline, and CLI process helpers.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use flowgen::error::{FlowError, RequestError};
use flowgen::events::{Observer, SuiteInfo};
use flowgen::flow::{FlowContext, FlowFactory, FlowRecord, UserFlow, flow_factory};
use flowgen::request::{Request, RequestMeta, RequestRecord, RequestResult};
use flowgen::suite::PhaseDefinition;

// ============================================================================
// Flows
// ============================================================================

/// What a [`ScriptedFlow`] does in its timed body.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Sleep, then succeed
    Sleep(Duration),
    /// Issue one ping request that takes this long
    Ping(Duration),
    /// Fail immediately
    Fail,
    /// Panic immediately
    Panic,
}

/// Flow whose behavior is fixed by a [`Script`].
pub struct ScriptedFlow {
    name: String,
    script: Script,
}

#[async_trait]
impl UserFlow for ScriptedFlow {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        match self.script {
            Script::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Script::Ping(delay) => {
                ctx.run_request::<Ping>("ping", vec!["probe".to_string()], delay)
                    .await;
                Ok(())
            }
            Script::Fail => Err(FlowError::Failed("scripted failure".to_string())),
            Script::Panic => panic!("scripted panic"),
        }
    }
}

/// Factory for a [`ScriptedFlow`] type.
pub fn scripted(name: &str, script: Script) -> Arc<dyn FlowFactory> {
    let owned = name.to_string();
    flow_factory(name, move |_| {
        Box::new(ScriptedFlow {
            name: owned.clone(),
            script,
        })
    })
}

/// Request that sleeps and reports status 200.
pub struct Ping {
    delay: Duration,
}

#[async_trait]
impl Request for Ping {
    type Params = Duration;

    const KIND: &'static str = "ping";

    fn build(delay: Duration) -> Self {
        Self { delay }
    }

    async fn run(&mut self, _meta: &RequestMeta) -> Result<RequestResult, RequestError> {
        tokio::time::sleep(self.delay).await;
        Ok(RequestResult::Status(200))
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Records every lifecycle event as a short string, in arrival order.
#[derive(Default)]
pub struct Timeline {
    events: Mutex<Vec<String>>,
    requests: Mutex<Vec<RequestRecord>>,
}

impl Timeline {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RequestRecord> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not recorded"))
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Observer for Timeline {
    fn on_suite_start(&self, _suite: &SuiteInfo) {
        self.push("suite_start".to_string());
    }

    fn on_suite_finish(&self, _suite: &SuiteInfo) {
        self.push("suite_finish".to_string());
    }

    fn on_phase_start(&self, phase: &PhaseDefinition) {
        self.push(format!("phase_start:{}", phase.name));
    }

    fn on_phase_finish(&self, phase: &PhaseDefinition) {
        self.push(format!("phase_finish:{}", phase.name));
    }

    fn on_flow_start(&self, flow: &FlowRecord, _phase: &PhaseDefinition) {
        self.push(format!("flow_start:{}", flow.id));
    }

    fn on_flow_finish(&self, flow: &FlowRecord, _phase: &PhaseDefinition) {
        self.push(format!("flow_finish:{}", flow.id));
    }

    fn on_request(&self, request: &RequestRecord) {
        self.push(format!("request:{}", request.result));
        self.requests.lock().unwrap().push(request.clone());
    }
}

// ============================================================================
// Files and processes
// ============================================================================

/// Path to a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Writes `yaml` to a temporary suite file.
pub fn suite_file(yaml: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("failed to create temp suite");
    file.write_all(yaml.as_bytes())
        .expect("failed to write temp suite");
    file
}

/// Runs the `flowgen` binary to completion.
pub fn spawn_command(args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_flowgen"))
        .args(args)
        .output()
        .expect("failed to run flowgen")
}
