//! Core domain + application logic for the Dogimo chat bot.
//!
//! This crate is framework-agnostic. Telegram and the OpenAI-compatible
//! model API live behind ports implemented in adapter crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod memory;
pub mod model;
pub mod pricing;
pub mod rate_limit;
pub mod session;
pub mod stats;

pub use errors::{Error, Result};
