//! CLI module for benchrun - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running and checking
//! test plans.

pub mod commands;

pub use commands::Cli;
