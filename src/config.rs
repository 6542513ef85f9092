use dotenvy::dotenv;
use std::env;

/// Credentials for the Pusher side channel. When absent, events are only
/// delivered over direct WebSocket connections.
#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub app_id: String,
    pub key: String,
    pub secret: String,
    pub cluster: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub pusher: Option<PusherConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;

        let pusher = match env::var("PUSHER_APP_ID") {
            Ok(app_id) if !app_id.trim().is_empty() => {
                let key = env::var("PUSHER_KEY")
                    .map_err(|_| crate::error::AppError::Config("PUSHER_KEY missing".into()))?;
                let secret = env::var("PUSHER_SECRET")
                    .map_err(|_| crate::error::AppError::Config("PUSHER_SECRET missing".into()))?;
                let cluster = env::var("PUSHER_CLUSTER").unwrap_or_else(|_| "mt1".into());
                Some(PusherConfig {
                    app_id,
                    key,
                    secret,
                    cluster,
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            pusher,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 8000,
            jwt_secret: "test-secret".into(),
            pusher: None,
        }
    }
}
