//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while serving, `"stopping"` once shutdown began.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Number of registered modules.
    pub modules: usize,
}

/// Build a health response.
pub fn health_check(start_time: Instant, modules: usize, stopping: bool) -> HealthResponse {
    HealthResponse {
        status: if stopping { "stopping" } else { "ok" },
        uptime_secs: start_time.elapsed().as_secs(),
        modules,
    }
}
