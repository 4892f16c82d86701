//! Application state for API handlers

use sigdesk_service::SigdeskService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The assembled application facade
    pub service: Arc<SigdeskService>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(service: Arc<SigdeskService>) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }
}
