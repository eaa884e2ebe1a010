//! Messenger abstraction (Telegram today) plus the throttling decorator.

pub mod port;
pub mod throttled;
pub mod types;
