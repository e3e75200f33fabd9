//! HTTP API for the clinic chatbot

mod handlers;
mod types;

pub use handlers::create_router;

use crate::orchestrator::Orchestrator;
use crate::session::Sessions;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, sessions: Sessions) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions,
        }
    }
}
