//! Core types for the extension runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (ExtensionId, CorrelationId, etc.)
//! - **Errors**: Runtime error taxonomy with thiserror derives
//! - **Config**: Configuration structures for transport, dispatcher and pool

mod config;
mod errors;
mod ids;

pub use config::{
    Config, DispatcherConfig, IntentConfig, ObservabilityConfig, OffloadConfig, TransportConfig,
};
pub use errors::{Error, Result};
pub use ids::{CorrelationId, EventId, ExtensionId, InstanceId};
