use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use marketplace_chat_service::config::Config;
use marketplace_chat_service::error::AppError;
use marketplace_chat_service::services::pusher::PusherClient;
use marketplace_chat_service::state::AppState;
use marketplace_chat_service::websocket::RoomRegistry;
use marketplace_chat_service::{db, logging, routes};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();

    let config = Config::from_env()?;
    let pool = db::init_pool(&config.database_url).await?;
    db::MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;

    let pusher = config.pusher.as_ref().map(|p| Arc::new(PusherClient::new(p)));
    if pusher.is_none() {
        info!("pusher side channel not configured, skipping mirror delivery");
    }

    let state = AppState {
        db: pool,
        registry: RoomRegistry::new(),
        pusher,
        config: Arc::new(config.clone()),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;
    info!("chat service listening on {addr}");

    axum::serve(listener, routes::build_router(state))
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))?;

    Ok(())
}
