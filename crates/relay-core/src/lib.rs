//! Core of the Telegram LLM relay.
//!
//! Framework-agnostic: Telegram, the completion endpoint and the SQLite turn log
//! live behind ports (traits) implemented in adapter crates. The two pieces with
//! real behavior live here: budgeted context windows (`context`) and paced reply
//! delivery (`streaming`).

pub mod config;
pub mod context;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod rate_limit;
pub mod streaming;

pub use errors::{Error, Result};
