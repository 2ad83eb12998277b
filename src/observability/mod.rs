//! Observability
//!
//! Logging, metrics, and the JSONL event stream.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventWriter};
pub use logging::{LogFormat, init_logging};
pub use metrics::init_metrics;
