//! `flowgen` - Phase-driven load generator
//!
//! Drives synthetic user flows against a target system at configurable,
//! optionally ramping, arrival rates. A suite is a sequence of timed
//! phases; each phase spawns flows chosen by weight, and every flow and
//! request reports its lifecycle to subscribed observers.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod http;
pub mod observability;
pub mod output;
pub mod request;
pub mod stats;
pub mod suite;
