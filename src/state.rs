use crate::{config::Config, services::pusher::PusherClient, websocket::RoomRegistry};
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: RoomRegistry,
    pub pusher: Option<Arc<PusherClient>>,
    pub config: Arc<Config>,
}
