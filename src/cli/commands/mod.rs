//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod run;
pub mod validate;
pub mod version;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands};
use crate::error::FlowgenError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `cancel` fires when the process receives its first shutdown signal.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), FlowgenError> {
    match cli.command {
        Commands::Run(args) => run::run(&args, cli.quiet, cancel).await,
        Commands::Validate(args) => validate::validate(&args),
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
