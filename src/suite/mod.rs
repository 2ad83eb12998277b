//! Suite execution
//!
//! Phases, rate ramps, weighted flow selection, and the engine that ties
//! them together.

pub mod definition;
pub mod engine;
pub mod ids;
pub mod phase;
pub mod ramp;
pub mod selector;

pub use definition::{FlowDefinition, PhaseDefinition, SuiteBuilder, SuiteDefinition};
pub use engine::{SuiteEngine, SuiteReport};
pub use ids::IdGenerator;
pub use phase::{FlowSpawner, POLL_INTERVAL, PhaseOutcome, PhaseRunner};
pub use ramp::{Clock, Ramp, SystemClock, TokioClock};
pub use selector::FlowSelector;
