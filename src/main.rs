mod broadcast;
mod config;
mod connection;
mod db;
mod event;
mod frame;
mod registry;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;

use config::{RealtimeConfig, ServerConfig};
use services::auth::SessionAuthenticator;
use store::PgStore;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let server = ServerConfig::from_env().expect("invalid server configuration");
    let pool = db::init_pool(&server.database_url, server.db_max_connections)
        .await
        .expect("database init failed");

    let realtime = RealtimeConfig::from_env();
    let state = state::AppState::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(SessionAuthenticator::new(pool)),
        realtime,
    );

    // Spawn background liveness monitor.
    let _liveness = services::liveness::spawn_liveness_monitor(state.registry.clone(), realtime.heartbeat_interval);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = server.port, "huddle listening");
    axum::serve(listener, app).await.expect("server failed");
}
