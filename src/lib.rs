//! ZoneWatch - Hosted Zone Change Monitor
//!
//! This library detects DNS zone configuration changes, either relayed from an
//! event bus or polled from another account's audit trail, and republishes
//! them as alerts on a notification topic.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod formatting;
pub mod internal_metrics;
pub mod lambda;
pub mod logging;
pub mod matching;
pub mod normalize;
pub mod notification;
pub mod poller;
pub mod relay;

// Re-export core types for convenience
pub use crate::core::*;
