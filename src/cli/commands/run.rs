//! `run` command handler
//!
//! Loads a suite file, resolves its flows, attaches the configured
//! observers, and drives the suite to completion.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::RunArgs;
use crate::config::{FlowRegistry, SuiteLoader};
use crate::error::FlowgenError;
use crate::http::create_http_client;
use crate::observability::EventWriter;
use crate::output::SummaryOutput;
use crate::suite::SuiteEngine;

/// Run a suite file.
///
/// Summaries are printed to stdout unless `--no-summary` or `quiet` is set.
///
/// # Errors
///
/// Returns a config error if the suite file is invalid, a phase error if
/// a phase cannot start, an I/O error if the events file cannot be
/// created, or `Interrupted` if `cancel` fires before the suite finishes.
pub async fn run(
    args: &RunArgs,
    quiet: bool,
    cancel: CancellationToken,
) -> Result<(), FlowgenError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    tracing::info!(suite = %args.suite.display(), "loading suite");
    let load_result = SuiteLoader::default().load(&args.suite)?;
    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    let client = create_http_client()?;
    let mut registry = FlowRegistry::new();
    registry.register_http_flows(&load_result.config, &client)?;
    let mut definition = registry.build_suite(&load_result.config)?;

    if let Some(timeout) = args.finish_timeout {
        definition.finish_timeout = timeout;
    }
    if let Some(seed) = args.seed {
        definition.seed = Some(seed);
    }

    let engine = SuiteEngine::new(definition);

    let events = match &args.events_file {
        Some(path) => {
            let writer = Arc::new(EventWriter::from_file(path)?);
            engine.subscribe(writer.clone());
            Some(writer)
        }
        None => None,
    };

    let summary = if args.no_summary || quiet {
        None
    } else {
        let output = Arc::new(SummaryOutput::stdout());
        engine.subscribe(output.clone());
        Some(output)
    };

    let result = tokio::select! {
        result = engine.run() => result.map_err(FlowgenError::from),
        () = cancel.cancelled() => {
            tracing::warn!("run interrupted before the suite finished");
            Err(FlowgenError::Interrupted)
        }
    };

    if let Some(writer) = &events {
        writer.flush();
        tracing::debug!(events = writer.event_count(), "event stream flushed");
    }
    if let Some(output) = &summary {
        output.flush();
    }

    let report = result?;
    if report.failed_flows > 0 {
        tracing::warn!(failed = report.failed_flows, "some flows failed");
    }
    tracing::info!(
        spawned = report.total_spawned(),
        orphaned = report.orphaned,
        "run complete"
    );

    Ok(())
}
