//! Suite configuration
//!
//! Loads and validates YAML suite files and resolves them into runnable
//! [`SuiteDefinition`](crate::suite::SuiteDefinition)s.

pub mod loader;
pub mod registry;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, LoadResult, LoadWarning, SuiteLoader};
pub use registry::FlowRegistry;
pub use schema::*;
pub use validation::{ValidationResult, Validator};
