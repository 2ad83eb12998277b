//! Console summary output
//!
//! [`SummaryOutput`] is an observer that prints phase progress, a segment
//! summary every few seconds while the suite runs, and a final suite
//! summary with request rate, duration statistics, and a result tally.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio_util::sync::CancellationToken;

use crate::events::{Observer, SuiteInfo};
use crate::request::{RequestRecord, RequestResult};
use crate::stats::{basic_stats, tally};
use crate::suite::definition::PhaseDefinition;

/// Interval between segment summaries.
pub const DEFAULT_CYCLE: Duration = Duration::from_secs(5);

/// Duration in milliseconds and result of one request.
type Sample = (f64, RequestResult);

struct SummaryState {
    out: Mutex<Box<dyn Write + Send>>,
    all: Mutex<Vec<Sample>>,
    segment: Mutex<Vec<Sample>>,
}

impl SummaryState {
    fn write(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn take_segment(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.segment.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Prints human-readable progress and summaries.
pub struct SummaryOutput {
    state: Arc<SummaryState>,
    cycle: Duration,
    cancel: CancellationToken,
}

impl SummaryOutput {
    /// Creates an output writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an output writing to `out`.
    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Arc::new(SummaryState {
                out: Mutex::new(out),
                all: Mutex::new(Vec::new()),
                segment: Mutex::new(Vec::new()),
            }),
            cycle: DEFAULT_CYCLE,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the segment summary interval.
    #[must_use]
    pub const fn with_cycle(mut self, cycle: Duration) -> Self {
        self.cycle = cycle;
        self
    }

    /// Flushes the underlying writer.
    pub fn flush(&self) {
        let _ = self
            .state
            .out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }

    /// Starts the segment summary task; stops when `cancel` fires.
    fn start_cycle_task(&self) {
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        let cycle = self.cycle;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + cycle, cycle);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let samples = state.take_segment();
                        let title = format!("Segment ending {}", now_iso());
                        state.write(&render_summary(&title, cycle.as_secs_f64(), &samples, None));
                    }
                }
            }
        });
    }
}

impl std::fmt::Debug for SummaryOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryOutput")
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl Observer for SummaryOutput {
    fn on_suite_start(&self, suite: &SuiteInfo) {
        self.start_cycle_task();
        self.state
            .write(&format!("  Starting suite {} ({})\n", suite.name, now_iso()));
    }

    fn on_suite_finish(&self, suite: &SuiteInfo) {
        self.cancel.cancel();
        self.state
            .write(&format!("  Suite {} finished ({})\n", suite.name, now_iso()));

        let samples = self.state.all.lock().unwrap_or_else(PoisonError::into_inner);
        let seconds = suite.elapsed.map_or(0.0, |d| d.as_secs_f64());
        self.state.write(&render_summary(
            "Suite Summary",
            seconds,
            &samples,
            Some(suite),
        ));
    }

    fn on_phase_start(&self, phase: &PhaseDefinition) {
        let ramp_to = phase
            .ramp_to
            .map_or_else(|| "none".to_string(), |r| r.to_string());
        self.state.write(&format!(
            "  Starting phase \"{}\" (duration={}, flowRate={}, rampTo={}) ({})\n",
            phase.name,
            phase.duration_secs,
            phase.flow_rate,
            ramp_to,
            now_iso()
        ));
    }

    fn on_phase_finish(&self, phase: &PhaseDefinition) {
        self.state
            .write(&format!("  Phase \"{}\" finished ({})\n", phase.name, now_iso()));
    }

    fn on_request(&self, request: &RequestRecord) {
        let sample = (request.duration_ms(), request.result.clone());
        self.state
            .all
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample.clone());
        self.state
            .segment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
    }
}

impl Drop for SummaryOutput {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Requests per second, truncated to two decimals.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn requests_per_second(count: usize, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    ((count as f64 / seconds) * 100.0).trunc() / 100.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_ms(ms: f64) -> String {
    let micros = (ms * 1_000.0).round().max(0.0) as u64;
    humantime::format_duration(Duration::from_micros(micros)).to_string()
}

fn render_summary(
    title: &str,
    seconds: f64,
    samples: &[Sample],
    suite: Option<&SuiteInfo>,
) -> String {
    use std::fmt::Write as _;

    let mut s = String::new();
    let _ = writeln!(s, "  {title}:");

    if let Some(suite) = suite {
        let _ = writeln!(s, "    start: {}", suite.started_at.to_rfc3339());
        if let Some(finished) = suite.finished_at {
            let _ = writeln!(s, "    finish: {}", finished.to_rfc3339());
        }
        let _ = writeln!(s, "    requests: {}", samples.len());
    }

    let _ = writeln!(s, "    rps: {}", requests_per_second(samples.len(), seconds));

    let durations: Vec<f64> = samples.iter().map(|(ms, _)| *ms).collect();
    let _ = writeln!(s, "    duration:");
    match basic_stats(&durations) {
        Some(stats) => {
            for (label, value) in [
                ("min", stats.min),
                ("max", stats.max),
                ("avg", stats.avg),
                ("p95", stats.p95),
                ("p99", stats.p99),
            ] {
                let _ = writeln!(s, "      {label}: {}", format_ms(value));
            }
        }
        None => {
            let _ = writeln!(s, "      no requests");
        }
    }

    let _ = writeln!(s, "    results:");
    for (result, count) in tally(samples.iter().map(|(_, result)| result)) {
        let _ = writeln!(s, "      {result}: {count}");
    }
    s.push('\n');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::request::RequestResult;

    #[derive(Clone)]
    struct TestWriter(Arc<Mutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn record(ms: u64, result: RequestResult) -> RequestRecord {
        RequestRecord {
            id: 1,
            flow_id: 1,
            kind: "test",
            name: "r".to_string(),
            groups: Vec::new(),
            phase: "Sustain".to_string(),
            started_at: None,
            finished_at: None,
            duration: Duration::from_millis(ms),
            result,
        }
    }

    fn suite_info() -> SuiteInfo {
        SuiteInfo {
            run_id: uuid::Uuid::nil(),
            name: "lb".to_string(),
            phase_count: 1,
            started_at: Utc::now(),
            finished_at: None,
            elapsed: None,
        }
    }

    #[test]
    fn test_rps_truncates() {
        assert!((requests_per_second(10, 3.0) - 3.33).abs() < 1e-9);
        assert!(requests_per_second(10, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(1_500.0), "1s 500ms");
        assert_eq!(format_ms(0.25), "250us");
    }

    #[test]
    fn test_render_summary_sections() {
        let samples = vec![
            (10.0, RequestResult::Status(200)),
            (20.0, RequestResult::Status(200)),
            (30.0, RequestResult::Error("timeout".to_string())),
        ];
        let text = render_summary("Segment", 5.0, &samples, None);
        assert!(text.contains("  Segment:\n"));
        assert!(text.contains("    rps: 0.6\n"));
        assert!(text.contains("      min: 10ms\n"));
        assert!(text.contains("      max: 30ms\n"));
        assert!(text.contains("      200: 2\n"));
        assert!(text.contains("      timeout: 1\n"));
        assert!(!text.contains("requests:"));
    }

    #[test]
    fn test_requests_kept_as_duration_and_result() {
        let output = SummaryOutput::new(Box::new(TestWriter::new()));
        output.on_request(&record(250, RequestResult::Status(200)));
        output.on_request(&record(500, RequestResult::Error("timeout".to_string())));

        let expected = vec![
            (250.0, RequestResult::Status(200)),
            (500.0, RequestResult::Error("timeout".to_string())),
        ];
        assert_eq!(*output.state.all.lock().unwrap(), expected);
        assert_eq!(output.state.take_segment(), expected);
        assert!(output.state.segment.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_segment_and_final_summary() {
        let tw = TestWriter::new();
        let output = Arc::new(SummaryOutput::new(Box::new(tw.clone())).with_cycle(Duration::from_secs(5)));
        let bus = EventBus::new();
        bus.subscribe(output.clone());

        let mut info = suite_info();
        bus.publish_suite_start(&info);
        bus.publish_request(&record(12, RequestResult::Status(200)));

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(tw.contents().contains("Segment ending"));
        assert!(tw.contents().contains("      200: 1\n"));

        bus.publish_request(&record(40, RequestResult::Status(500)));
        info.finished_at = Some(Utc::now());
        info.elapsed = Some(Duration::from_secs(8));
        bus.publish_suite_finish(&info);
        output.flush();

        let text = tw.contents();
        assert!(text.contains("  Suite lb finished"));
        assert!(text.contains("  Suite Summary:\n"));
        assert!(text.contains("    requests: 2\n"));
        assert!(text.contains("    rps: 0.25\n"));
        assert!(text.contains("      500: 1\n"));
    }
}
