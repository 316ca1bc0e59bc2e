use crate::config::Config;
use crate::pipeline::service::PlacementPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the store and the eligible-list notifier.
    pub pipeline: PlacementPipeline,
    pub config: Config,
}
