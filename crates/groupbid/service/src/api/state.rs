//! Application state for API handlers

use crate::service::GroupService;
use crate::sweeper::Sweeper;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The command/query surface
    pub service: Arc<GroupService>,

    /// Sweeper handle (for manual sweep triggers)
    pub sweeper: Arc<Sweeper>,

    /// Service version
    pub version: String,

    /// Service start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(service: Arc<GroupService>, sweeper: Arc<Sweeper>) -> Self {
        Self {
            service,
            sweeper,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }
}
