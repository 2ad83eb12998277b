//! `validate` command handler
//!
//! Loads each suite file through the full pipeline and resolves its flow
//! references, without running anything.

use std::path::Path;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::{FlowRegistry, LoadWarning, SuiteLoader};
use crate::error::{ConfigError, FlowgenError, Severity, ValidationIssue};
use crate::http::create_http_client;

/// Validate suite files.
///
/// Stops at the first invalid file.
///
/// # Errors
///
/// Returns an I/O error if a file does not exist, or a config error if
/// loading, validation, or flow resolution fails. With `--strict`, any
/// warning is reported as a validation error.
pub fn validate(args: &ValidateArgs) -> Result<(), FlowgenError> {
    for path in &args.files {
        if !path.exists() {
            return Err(FlowgenError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
        tracing::info!(file = %path.display(), "validating suite");

        let warnings = check_file(path, args.strict)?;
        for warning in &warnings {
            tracing::warn!(
                location = warning.location.as_deref().unwrap_or("<unknown>"),
                "{}",
                warning.message
            );
        }

        match args.format {
            OutputFormat::Human => println!("{}: ok", path.display()),
            OutputFormat::Json => {
                let line = serde_json::json!({
                    "file": path.display().to_string(),
                    "valid": true,
                    "warnings": warnings
                        .iter()
                        .map(|w| serde_json::json!({
                            "message": w.message,
                            "location": w.location,
                        }))
                        .collect::<Vec<_>>(),
                });
                println!("{line}");
            }
        }
    }

    Ok(())
}

/// Loads one file and resolves its flows, returning its warnings.
fn check_file(path: &Path, strict: bool) -> Result<Vec<LoadWarning>, FlowgenError> {
    let load_result = SuiteLoader::default().load(path)?;

    let client = create_http_client()?;
    let mut registry = FlowRegistry::new();
    registry.register_http_flows(&load_result.config, &client)?;
    registry.build_suite(&load_result.config)?;

    if strict && !load_result.warnings.is_empty() {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: load_result
                .warnings
                .iter()
                .map(|w| ValidationIssue {
                    path: w.location.clone().unwrap_or_default(),
                    message: w.message.clone(),
                    severity: Severity::Warning,
                })
                .collect(),
        }
        .into());
    }

    Ok(load_result.warnings)
}
