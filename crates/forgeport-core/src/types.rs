//! Custom types for common data structures

use chrono::{DateTime as ChronoDateTime, Utc};

/// Standard UTC DateTime type used across all Forgeport crates
///
/// This is the canonical datetime type for API responses and domain
/// read-models (serializes as ISO 8601 with 'Z' suffix).
///
/// # Example
/// ```rust
/// use forgeport_core::UtcDateTime;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// pub struct Response {
///     pub created_at: UtcDateTime,
/// }
/// ```
pub type UtcDateTime = ChronoDateTime<Utc>;
