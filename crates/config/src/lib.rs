//! Configuration module for vidfix
//!
//! Handles loading configuration from TOML files, environment variable overrides
//! and validation of the values the conversion pipeline depends on.

pub mod config;

pub use config::*;
