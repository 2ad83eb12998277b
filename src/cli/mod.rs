//! Command-line interface
//!
//! Argument parsing and command handlers for the `flowgen` binary.

pub mod args;
pub mod commands;
