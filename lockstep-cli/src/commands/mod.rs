//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (get, set, list, path)
//! - [`estimate`] - Crack-time estimate
//! - [`keystore`] - Keystore inspection
//! - [`wordlist`] - Wordlist download, verification, and lookup

pub mod common;
pub mod config;
pub mod estimate;
pub mod keystore;
pub mod wordlist;
