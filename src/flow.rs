//! User flow lifecycle
//!
//! A flow is one simulated user journey. Flow types implement
//! [`UserFlow`]; the engine creates instances through a [`FlowFactory`] and
//! drives each one through `Created → Setup → Running → Finished` with a
//! [`FlowExecution`]. Setup is optional and untimed: the start timestamp
//! and the flow start event come after it completes.
//!
//! Flows are never cancelled. Once spawned, a flow runs to completion even
//! if its phase, or the whole suite, has ended.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FlowError;
use crate::events::EventBus;
use crate::observability::metrics;
use crate::request::{Request, RequestExecution, RequestMeta, RequestRecord};
use crate::suite::definition::PhaseDefinition;
use crate::suite::ids::IdGenerator;

/// Run-scoped flow identifier.
pub type FlowId = u64;

/// Behavior of a flow type.
#[async_trait]
pub trait UserFlow: Send {
    /// Flow type name used in reports.
    fn name(&self) -> &str;

    /// Untimed preparation before the flow starts. Defaults to nothing.
    async fn setup(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
        let _ = ctx;
        Ok(())
    }

    /// The timed body of the flow.
    async fn run(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError>;
}

/// Creates flow instances for a flow type.
pub trait FlowFactory: Send + Sync {
    /// Flow type name, used to reference the type from suite files.
    fn name(&self) -> &str;

    /// Creates a fresh flow for a spawn in `phase`.
    fn create(&self, phase: &Arc<PhaseDefinition>) -> Box<dyn UserFlow>;
}

/// [`FlowFactory`] backed by a closure.
pub struct FnFlowFactory<F> {
    name: String,
    create: F,
}

impl<F> FlowFactory for FnFlowFactory<F>
where
    F: Fn(&Arc<PhaseDefinition>) -> Box<dyn UserFlow> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, phase: &Arc<PhaseDefinition>) -> Box<dyn UserFlow> {
        (self.create)(phase)
    }
}

/// Wraps a closure as a shared flow factory.
pub fn flow_factory<F>(name: impl Into<String>, create: F) -> Arc<dyn FlowFactory>
where
    F: Fn(&Arc<PhaseDefinition>) -> Box<dyn UserFlow> + Send + Sync + 'static,
{
    Arc::new(FnFlowFactory {
        name: name.into(),
        create,
    })
}

/// How a flow ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// `setup` and `run` returned `Ok`
    Completed,
    /// `setup` or `run` returned an error
    Failed(String),
}

/// Lifecycle state of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// Spawned, setup not finished
    Created,
    /// Timed body executing
    Running,
    /// Body returned
    Finished,
}

/// Bookkeeping for one flow execution, published with flow events.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    /// Flow id
    pub id: FlowId,
    /// Flow type name
    pub name: String,
    /// Phase the flow was spawned in
    pub phase: String,
    /// When the timed body started
    pub started_at: Option<DateTime<Utc>>,
    /// When the timed body finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Requests issued so far, in issue order
    pub requests: Vec<Arc<RequestRecord>>,
    /// Set once the flow finishes
    pub outcome: Option<FlowOutcome>,
}

impl FlowRecord {
    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> FlowState {
        match (self.started_at, self.finished_at) {
            (_, Some(_)) => FlowState::Finished,
            (Some(_), None) => FlowState::Running,
            (None, None) => FlowState::Created,
        }
    }

    /// Whether the flow finished with an error.
    #[must_use]
    pub const fn failed(&self) -> bool {
        matches!(self.outcome, Some(FlowOutcome::Failed(_)))
    }
}

/// Handle given to a flow's `setup` and `run` for issuing requests.
pub struct FlowContext {
    flow_id: FlowId,
    phase: Arc<PhaseDefinition>,
    requests: Vec<Arc<RequestRecord>>,
    bus: Arc<EventBus>,
    ids: Arc<IdGenerator>,
}

impl FlowContext {
    /// Creates a context for flow `flow_id`.
    #[must_use]
    pub const fn new(
        flow_id: FlowId,
        phase: Arc<PhaseDefinition>,
        bus: Arc<EventBus>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            flow_id,
            phase,
            requests: Vec::new(),
            bus,
            ids,
        }
    }

    /// Id of the owning flow.
    #[must_use]
    pub const fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    /// Phase the owning flow was spawned in.
    #[must_use]
    pub const fn phase(&self) -> &Arc<PhaseDefinition> {
        &self.phase
    }

    /// Requests issued so far.
    #[must_use]
    pub fn requests(&self) -> &[Arc<RequestRecord>] {
        &self.requests
    }

    /// Builds and executes one request, records it, and publishes it.
    ///
    /// The finished execution is returned so that the flow can use its
    /// response in later requests.
    pub async fn run_request<R: Request>(
        &mut self,
        name: &str,
        groups: Vec<String>,
        params: R::Params,
    ) -> RequestExecution<R> {
        let meta = RequestMeta {
            id: self.ids.next_request(),
            flow_id: self.flow_id,
            name: name.to_string(),
            groups,
            phase: Arc::clone(&self.phase),
        };

        let mut execution = RequestExecution::<R>::new(meta, params);
        execution.exec().await;

        let record = Arc::new(execution.record());
        metrics::record_request(&record);
        self.requests.push(Arc::clone(&record));
        self.bus.publish_request(&record);

        execution
    }
}

impl std::fmt::Debug for FlowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("flow_id", &self.flow_id)
            .field("phase", &self.phase.name)
            .field("requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}

/// Drives one flow instance through its lifecycle.
pub struct FlowExecution {
    flow: Box<dyn UserFlow>,
    ctx: FlowContext,
}

impl FlowExecution {
    /// Wraps a freshly created flow.
    #[must_use]
    pub const fn new(flow: Box<dyn UserFlow>, ctx: FlowContext) -> Self {
        Self { flow, ctx }
    }

    /// Runs setup, then the timed body, publishing flow start and finish.
    ///
    /// Errors and panics from `setup` or `run` are recorded as the outcome;
    /// a failed setup skips `run` but still produces the start/finish pair.
    pub async fn exec(mut self) -> FlowRecord {
        let bus = Arc::clone(&self.ctx.bus);
        let phase = Arc::clone(&self.ctx.phase);

        let setup = caught(self.flow.setup(&mut self.ctx)).await;

        let mut record = FlowRecord {
            id: self.ctx.flow_id,
            name: self.flow.name().to_string(),
            phase: phase.name.clone(),
            started_at: Some(Utc::now()),
            finished_at: None,
            requests: Vec::new(),
            outcome: None,
        };
        metrics::record_flow_started(&record.name);
        bus.publish_flow_start(&record, &phase);

        let result = match setup {
            Ok(()) => caught(self.flow.run(&mut self.ctx)).await,
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(()) => FlowOutcome::Completed,
            Err(e) => {
                warn!(flow_id = record.id, flow = %record.name, error = %e, "flow failed");
                FlowOutcome::Failed(e.to_string())
            }
        };

        record.finished_at = Some(Utc::now());
        record.requests = std::mem::take(&mut self.ctx.requests);
        record.outcome = Some(outcome);

        debug!(
            flow_id = record.id,
            flow = %record.name,
            requests = record.requests.len(),
            "flow finished"
        );
        metrics::record_flow_finished(&record.name, record.failed());
        bus.publish_flow_finish(&record, &phase);

        record
    }
}

/// Converts a panic in a flow step into [`FlowError::Panicked`].
async fn caught<F>(step: F) -> Result<(), FlowError>
where
    F: Future<Output = Result<(), FlowError>>,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(FlowError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}


#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::RequestError;
    use crate::events::Observer;
    use crate::request::RequestResult;

    struct Echo(u16);

    #[async_trait]
    impl Request for Echo {
        type Params = u16;
        const KIND: &'static str = "echo";

        fn build(status: u16) -> Self {
            Self(status)
        }

        async fn run(&mut self, _meta: &RequestMeta) -> Result<RequestResult, RequestError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(RequestResult::Status(self.0))
        }
    }

    /// Logs in during setup, then chains a request on the login result.
    struct Checkout {
        fail_setup: bool,
    }

    struct Exploding;

    #[async_trait]
    impl UserFlow for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        async fn run(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
            ctx.run_request::<Echo>("before", vec![], 200).await;
            panic!("boom");
        }
    }

    #[async_trait]
    impl UserFlow for Checkout {
        fn name(&self) -> &str {
            "checkout"
        }

        async fn setup(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
            if self.fail_setup {
                return Err(FlowError::Failed("no session".to_string()));
            }
            ctx.run_request::<Echo>("login", vec![], 200).await;
            Ok(())
        }

        async fn run(&mut self, ctx: &mut FlowContext) -> Result<(), FlowError> {
            let cart = ctx
                .run_request::<Echo>("cart", vec!["shop".to_string()], 201)
                .await;
            let status = match cart.result() {
                Some(RequestResult::Status(s)) => *s,
                _ => 0,
            };
            ctx.run_request::<Echo>("pay", vec!["shop".to_string()], status + 1)
                .await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Observer for Log {
        fn on_flow_start(&self, flow: &FlowRecord, _phase: &PhaseDefinition) {
            self.0.lock().unwrap().push(format!(
                "flow-start:{}:{}",
                flow.id,
                flow.requests.len()
            ));
        }

        fn on_flow_finish(&self, flow: &FlowRecord, _phase: &PhaseDefinition) {
            self.0
                .lock()
                .unwrap()
                .push(format!("flow-finish:{}:{}", flow.id, flow.requests.len()));
        }

        fn on_request(&self, request: &RequestRecord) {
            self.0
                .lock()
                .unwrap()
                .push(format!("request:{}:{}", request.name, request.result));
        }
    }

    fn context(bus: &Arc<EventBus>) -> FlowContext {
        FlowContext::new(
            42,
            Arc::new(PhaseDefinition::new(1, "Sustain", 10, 2.0, None)),
            Arc::clone(bus),
            Arc::new(IdGenerator::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_event_order() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Log::default());
        bus.subscribe(log.clone());

        let record = FlowExecution::new(Box::new(Checkout { fail_setup: false }), context(&bus))
            .exec()
            .await;

        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                "request:login:200",
                "flow-start:42:0",
                "request:cart:201",
                "request:pay:202",
                "flow-finish:42:3",
            ]
        );
        assert_eq!(record.outcome, Some(FlowOutcome::Completed));
        assert_eq!(record.state(), FlowState::Finished);
        assert_eq!(record.phase, "Sustain");
        let ids: Vec<u64> = record.requests.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_still_pairs_events() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Log::default());
        bus.subscribe(log.clone());

        let record = FlowExecution::new(Box::new(Checkout { fail_setup: true }), context(&bus))
            .exec()
            .await;

        assert!(record.failed());
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["flow-start:42:0", "flow-finish:42:0"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_run_becomes_failed_outcome() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Log::default());
        bus.subscribe(log.clone());

        let record = FlowExecution::new(Box::new(Exploding), context(&bus))
            .exec()
            .await;

        assert_eq!(
            record.outcome,
            Some(FlowOutcome::Failed("flow panicked: boom".to_string()))
        );
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["flow-start:42:0", "request:before:200", "flow-finish:42:1"]
        );
    }

    #[test]
    fn test_record_state_transitions() {
        let mut record = FlowRecord {
            id: 1,
            name: "f".to_string(),
            phase: "p".to_string(),
            started_at: None,
            finished_at: None,
            requests: Vec::new(),
            outcome: None,
        };
        assert_eq!(record.state(), FlowState::Created);
        record.started_at = Some(Utc::now());
        assert_eq!(record.state(), FlowState::Running);
        record.finished_at = Some(Utc::now());
        assert_eq!(record.state(), FlowState::Finished);
    }
}
