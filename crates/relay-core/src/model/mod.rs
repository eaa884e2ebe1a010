//! Completion port: typed chat messages and the client trait.

pub mod client;
pub mod types;
