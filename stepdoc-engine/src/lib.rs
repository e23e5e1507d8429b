//! stepdoc-engine library - Step Document Engine
//!
//! Stores versioned, semi-structured per-step project documents: legacy
//! shapes are migrated into the canonical schema on read, saves compute a
//! weighted completion score and pass the one-time credit gate, submission
//! freezes a document read-only, and connected editors reconcile through a
//! payload-less change feed by reloading the persisted state.

use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use stepdoc_common::events::EventBus;

pub mod api;
pub mod controller;
pub mod schema;
pub mod store;
pub mod submission;
pub mod sync;

use controller::StepController;
use schema::StepRegistry;
use store::StepRepository;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Change-notification fan-out
    pub bus: Arc<EventBus>,
    /// The shared step document controller
    pub controller: StepController,
}

impl AppState {
    /// Create application state over an initialized database
    pub fn new(db: SqlitePool, event_capacity: usize) -> Self {
        let registry = Arc::new(StepRegistry::builtin());
        let bus = Arc::new(EventBus::new(event_capacity));
        let repo = StepRepository::new(db.clone(), registry);
        let controller = StepController::new(repo, bus.clone());

        Self { db, bus, controller }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/projects", post(api::create_project))
        .route("/api/projects/:id", get(api::get_project))
        .route(
            "/api/projects/:id/steps/:step",
            get(api::get_step).put(api::save_step),
        )
        .route("/api/projects/:id/steps/:step/submit", post(api::submit_step))
        .route(
            "/api/projects/:id/steps/:step/withdraw",
            post(api::withdraw_step),
        )
        .route(
            "/api/projects/:id/steps/:step/reference/:source",
            get(api::get_reference),
        )
        .route("/api/projects/:id/events", get(api::event_stream));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
