use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use repsync_api::api::{init_routes, AppState};
use repsync_api::projections::{
    InMemoryProjectionStore, PostgresProjectionStore, ProjectionStore,
};
use repsync_api::store::{EventLog, InMemoryEventLog, PostgresEventLog};

mod config;

use config::{AppConfig, StorageBackend};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    let (log, projections): (Arc<dyn EventLog>, Arc<dyn ProjectionStore>) = match &config.storage {
        StorageBackend::Postgres(pool) => {
            let log = PostgresEventLog::new(pool.clone());
            log.ensure_schema()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            let store = PostgresProjectionStore::new(pool.clone());
            store
                .ensure_schema()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            tracing::info!("using PostgreSQL event log");
            (Arc::new(log), Arc::new(store))
        }
        StorageBackend::InMemory => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores (nothing survives restart)");
            (
                Arc::new(InMemoryEventLog::new()),
                Arc::new(InMemoryProjectionStore::new()),
            )
        }
    };

    let mut state = AppState::new(log, projections);
    state.rebuild_after_events = config.rebuild_after_events;
    let state = web::Data::new(state);

    let server_address = config.server_address();
    tracing::info!("starting sync server at http://{}", server_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(init_routes)
    })
    .bind(server_address)?
    .run()
    .await
}
