//! Shared application state handed to every Axum handler.
//!
//! Grounded on the teacher's `AppState` (a flat `Arc`-wrapped bag of
//! singletons built once in `main.rs` and cloned cheaply per request) —
//! narrowed to this pipeline's actual dependencies: the orchestrator plus
//! the two things a handler needs outside of it (settings, for
//! request-size/timeout checks at the boundary, and the memory store
//! directly, for the `/memory` endpoints which bypass the ask pipeline).

use std::sync::Arc;

use askd_config::settings::Settings;
use askd_core::traits::MemoryStore;

use crate::orchestrator::AskOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AskOrchestrator>,
    pub memory_store: Option<Arc<dyn MemoryStore>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(orchestrator: Arc<AskOrchestrator>, settings: Arc<Settings>) -> Self {
        let memory_store = orchestrator.memory_store();
        Self {
            orchestrator,
            memory_store,
            settings,
        }
    }
}
