//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// `?limit=` for command history. Clamped by the dispatcher (default 20,
/// max 100).
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}
