//! Configuration for the outbound HTTP transport

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the shared HTTP connection pool.
///
/// The pool's idle sweeper is the only background activity this library
/// owns; everything else runs on the calling task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Seconds an idle connection may linger before the sweeper drops it.
    pub pool_idle_timeout_secs: u64,
    /// Seconds allowed for establishing a connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed for a full request/response round trip.
    pub request_timeout_secs: u64,
    /// User agent sent on every request.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 8,
            pool_idle_timeout_secs: 30,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: format!("Forgeport/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpSettings {
    /// Build a `reqwest::Client` from these settings.
    pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(self.pool_idle_timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
    }
}
