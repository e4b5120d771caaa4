use axum::{
    routing::{get, post, put},
    Router,
};
use rusqlite::Connection;
use schoolday_core::config::SchooldayConfig;
use schoolday_history::{ArchivalJob, Recommender};
use schoolday_schedule::ScheduleStore;
use schoolday_sync::ChangeBus;
use std::sync::{Arc, Mutex};

/// Handles to every subsystem, shared by all handlers.
pub struct AppState {
    pub config: SchooldayConfig,
    pub store: Arc<ScheduleStore>,
    pub bus: Arc<ChangeBus>,
    pub archive: Arc<ArchivalJob>,
    pub recommender: Arc<Recommender>,
}

impl AppState {
    /// Build every subsystem on one shared connection. Schema creation is
    /// idempotent, so this is safe on an existing database.
    pub fn new(config: SchooldayConfig, db: Arc<Mutex<Connection>>) -> schoolday_history::Result<Self> {
        let bus = Arc::new(ChangeBus::new(&config.sync));
        let store = Arc::new(ScheduleStore::new(db.clone(), bus.clone(), config.positions)?);
        let recommender = Arc::new(Recommender::new(db.clone(), config.recommend.clone())?);
        let archive = Arc::new(ArchivalJob::new(
            db,
            store.clone(),
            Some(recommender.clone()),
        )?);
        Ok(Self {
            config,
            store,
            bus,
            archive,
            recommender,
        })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    use crate::http::{archive, health, recommend, schedule, sync};

    Router::new()
        .route("/health", get(health::health_handler))
        .route("/sync/poll", get(sync::poll_handler))
        .route("/sync/push", post(sync::push_handler))
        .route("/schedule/{school}/{date}", get(schedule::get_day))
        .route("/schedule/{school}/{date}/publish", put(schedule::set_published))
        .route("/schedule/{school}/{date}/columns", post(schedule::create_column))
        .route(
            "/schedule/{school}/{date}/columns/{column}",
            put(schedule::upsert_cells).delete(schedule::delete_column),
        )
        .route(
            "/schedule/{school}/{date}/columns/{column}/hours/{hour}",
            put(schedule::upsert_cell).delete(schedule::delete_cell),
        )
        .route(
            "/schedule/{school}/{date}/columns/{column}/move",
            post(schedule::move_column),
        )
        .route("/archive", post(archive::archive_handler))
        .route("/archive/backfill", post(archive::backfill_handler))
        .route("/recommend/{school}/{day}", get(recommend::recommend_handler))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
