use std::sync::Arc;

use graph_collector::config::ServerConfig;
use graph_collector::routes;
use graph_collector::services::persistence::FileStore;
use graph_collector::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    tokio::fs::create_dir_all(&config.sidetable_dir)
        .await
        .expect("failed to create side-table directory");

    let state = AppState::new(Arc::new(FileStore::new(&config.sidetable_dir)));
    let app = routes::app(state);

    let port = config.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, dir = %config.sidetable_dir.display(), "sidetable server listening");
    axum::serve(listener, app).await.expect("server failed");
}
