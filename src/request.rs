//! Request lifecycle
//!
//! A request is one timed unit of protocol work issued by a flow. The
//! protocol-specific part lives in a [`Request`] implementation; the
//! surrounding [`RequestExecution`] records identity, timestamps, and the
//! result classification, and converts a failed `run` into an error
//! classification so that reporting tallies failures next to successes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::RequestError;
use crate::flow::FlowId;
use crate::suite::definition::PhaseDefinition;

/// Run-scoped request identifier.
pub type RequestId = u64;

/// Classification of a finished request.
///
/// Serialized as the bare number or token so that sinks can key tallies by
/// it directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RequestResult {
    /// Protocol status code (e.g. an HTTP status)
    Status(u16),
    /// Any other numeric code
    Code(i64),
    /// Transport failure token (e.g. `"timeout"`)
    Error(String),
    /// Free-form classification token
    Token(String),
}

impl RequestResult {
    /// Whether this classification came from a failed `run`.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl std::fmt::Display for RequestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(s) => write!(f, "{s}"),
            Self::Code(c) => write!(f, "{c}"),
            Self::Error(t) | Self::Token(t) => f.write_str(t),
        }
    }
}

/// Identity of a request, handed to the implementation at run time.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Request id
    pub id: RequestId,
    /// Id of the flow that issued the request
    pub flow_id: FlowId,
    /// Request name (e.g. `"healthcheck"`)
    pub name: String,
    /// Group tags used by reporting
    pub groups: Vec<String>,
    /// Phase the owning flow was spawned in
    pub phase: Arc<PhaseDefinition>,
}

/// Protocol-specific request behavior.
#[async_trait]
pub trait Request: Send + Sync + 'static {
    /// Protocol parameters the request is built from.
    type Params: Send;

    /// Short protocol name recorded with every execution (e.g. `"http"`).
    const KIND: &'static str;

    /// Builds the request from its parameters.
    fn build(params: Self::Params) -> Self
    where
        Self: Sized;

    /// Performs the protocol work and classifies the outcome.
    async fn run(&mut self, meta: &RequestMeta) -> Result<RequestResult, RequestError>;

    /// Duration measured by the implementation's own instrumentation.
    ///
    /// When `None`, the interval between start and finish is used.
    fn duration(&self) -> Option<Duration> {
        None
    }
}

/// One execution of a [`Request`], owned by the flow that issued it.
#[derive(Debug)]
pub struct RequestExecution<R> {
    meta: RequestMeta,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    elapsed: Duration,
    result: Option<RequestResult>,
    inner: R,
}

impl<R: Request> RequestExecution<R> {
    /// Builds an execution that has not run yet.
    pub fn new(meta: RequestMeta, params: R::Params) -> Self {
        Self {
            meta,
            started_at: None,
            finished_at: None,
            elapsed: Duration::ZERO,
            result: None,
            inner: R::build(params),
        }
    }

    /// Runs the request, recording timestamps and the classification.
    pub async fn exec(&mut self) {
        self.started_at = Some(Utc::now());
        let start = Instant::now();

        let outcome = self.inner.run(&self.meta).await;

        self.elapsed = start.elapsed();
        self.finished_at = Some(Utc::now());

        self.result = Some(match outcome {
            Ok(result) => result,
            Err(e) => {
                debug!(
                    request_id = self.meta.id,
                    name = %self.meta.name,
                    error = %e,
                    "request failed"
                );
                RequestResult::Error(e.code().to_string())
            }
        });
    }

    /// Request metadata.
    #[must_use]
    pub const fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// Result classification, once executed.
    #[must_use]
    pub const fn result(&self) -> Option<&RequestResult> {
        self.result.as_ref()
    }

    /// When `exec` started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When `exec` finished.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Instrumented duration, or the measured interval.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.inner.duration().unwrap_or(self.elapsed)
    }

    /// The protocol-specific request, e.g. to read response data.
    #[must_use]
    pub const fn inner(&self) -> &R {
        &self.inner
    }

    /// Consumes the execution, returning the protocol-specific request.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Snapshot of this execution for observers.
    #[must_use]
    pub fn record(&self) -> RequestRecord {
        RequestRecord {
            id: self.meta.id,
            flow_id: self.meta.flow_id,
            kind: R::KIND,
            name: self.meta.name.clone(),
            groups: self.meta.groups.clone(),
            phase: self.meta.phase.name.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration: self.duration(),
            result: self
                .result
                .clone()
                .unwrap_or_else(|| RequestResult::Token("pending".to_string())),
        }
    }
}

/// Read-only view of a finished request, published to observers.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    /// Request id
    pub id: RequestId,
    /// Id of the issuing flow
    pub flow_id: FlowId,
    /// Protocol name
    pub kind: &'static str,
    /// Request name
    pub name: String,
    /// Group tags
    pub groups: Vec<String>,
    /// Phase name
    pub phase: String,
    /// Start timestamp
    pub started_at: Option<DateTime<Utc>>,
    /// Finish timestamp
    pub finished_at: Option<DateTime<Utc>>,
    /// Request duration
    #[serde(rename = "duration_ms", serialize_with = "serialize_ms")]
    pub duration: Duration,
    /// Result classification
    pub result: RequestResult,
}

impl RequestRecord {
    /// Duration in fractional milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.0
    }
}

fn serialize_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy {
        delay: Duration,
        outcome: Result<u16, &'static str>,
    }

    #[async_trait]
    impl Request for Sleepy {
        type Params = (u64, Result<u16, &'static str>);
        const KIND: &'static str = "test";

        fn build((delay_ms, outcome): Self::Params) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                outcome,
            }
        }

        async fn run(&mut self, _meta: &RequestMeta) -> Result<RequestResult, RequestError> {
            tokio::time::sleep(self.delay).await;
            self.outcome
                .map(RequestResult::Status)
                .map_err(|e| RequestError::Connect(e.to_string()))
        }
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            id: 7,
            flow_id: 3,
            name: "login".to_string(),
            groups: vec!["auth".to_string()],
            phase: Arc::new(PhaseDefinition::new(0, "Phase 0", 1, 1.0, None)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_records_timestamps_and_result() {
        let mut req = RequestExecution::<Sleepy>::new(meta(), (40, Ok(204)));
        assert!(req.result().is_none());

        req.exec().await;

        assert_eq!(req.result(), Some(&RequestResult::Status(204)));
        assert!(req.started_at().unwrap() <= req.finished_at().unwrap());
        assert_eq!(req.duration(), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_becomes_error_classification() {
        let mut req = RequestExecution::<Sleepy>::new(meta(), (5, Err("refused")));
        req.exec().await;

        let result = req.result().unwrap();
        assert!(result.is_error());
        assert_eq!(result.to_string(), "connect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_snapshot() {
        let mut req = RequestExecution::<Sleepy>::new(meta(), (10, Ok(200)));
        req.exec().await;

        let record = req.record();
        assert_eq!(record.id, 7);
        assert_eq!(record.flow_id, 3);
        assert_eq!(record.kind, "test");
        assert_eq!(record.phase, "Phase 0");
        assert_eq!(record.groups, vec!["auth".to_string()]);
        assert!((record.duration_ms() - 10.0).abs() < 1e-9);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["result"], 200);
        assert_eq!(json["duration_ms"], 10.0);
    }

    #[test]
    fn test_result_display() {
        assert_eq!(RequestResult::Status(404).to_string(), "404");
        assert_eq!(RequestResult::Code(-3).to_string(), "-3");
        assert_eq!(RequestResult::Error("timeout".into()).to_string(), "timeout");
        assert_eq!(RequestResult::Token("ok".into()).to_string(), "ok");
        assert!(!RequestResult::Token("ok".into()).is_error());
    }
}
