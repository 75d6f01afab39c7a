use std::sync::Arc;

use axum::{routing::post, Router};
use tower_http::trace::TraceLayer;

use crate::agent::AgentSupervisor;
use crate::config::AppConfig;
use crate::workflow::Orchestrator;
use crate::workspace::GitCheckout;

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Production wiring: libgit2 checkout and the real agent process.
    pub fn new(config: AppConfig) -> Self {
        let orchestrator = Orchestrator::new(
            &config,
            Arc::new(GitCheckout),
            Arc::new(AgentSupervisor::new(&config.agent)),
        );
        Self::with_orchestrator(config, orchestrator)
    }

    pub fn with_orchestrator(config: AppConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(crate::webhook::handler::handle_webhook))
        .route("/health", axum::routing::get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
