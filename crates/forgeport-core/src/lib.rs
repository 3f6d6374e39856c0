//! Core utilities and types shared across all Forgeport crates

pub mod config;
pub mod pagination;
pub mod types;

pub use config::*;
pub use pagination::*;
pub use types::*;

// Re-export external dependencies
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
