//! Pusher HTTP API client used as the best-effort side channel.
//!
//! Clients without an open WebSocket room subscription still receive
//! `new-message` events through their Pusher subscription, so every
//! persisted message is mirrored here after the direct broadcast.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::PusherConfig;

type HmacSha256 = Hmac<Sha256>;

pub fn channel_for_conversation(id: Uuid) -> String {
    format!("private-conversation-{}", id)
}

#[derive(Debug, thiserror::Error)]
pub enum PusherError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pusher responded with status {0}")]
    Status(u16),
}

pub struct PusherClient {
    app_id: String,
    key: String,
    secret: String,
    cluster: String,
    http: reqwest::Client,
}

impl PusherClient {
    pub fn new(cfg: &PusherConfig) -> Self {
        Self {
            app_id: cfg.app_id.clone(),
            key: cfg.key.clone(),
            secret: cfg.secret.clone(),
            cluster: cfg.cluster.clone(),
            http: reqwest::Client::new(),
        }
    }

    fn sign(&self, input: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("hmac accepts keys of any length");
        mac.update(input.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signed URL for the trigger-event endpoint. Query parameters must be
    /// in alphabetical order before signing.
    fn signed_event_url(&self, body: &str, timestamp: i64) -> String {
        let path = format!("/apps/{}/events", self.app_id);
        let body_md5 = hex::encode(Md5::digest(body.as_bytes()));
        let query = format!(
            "auth_key={}&auth_timestamp={}&auth_version=1.0&body_md5={}",
            self.key, timestamp, body_md5
        );
        let signature = self.sign(&format!("POST\n{}\n{}", path, query));
        format!(
            "https://api-{}.pusher.com{}?{}&auth_signature={}",
            self.cluster, path, query, signature
        )
    }

    /// Publish an event on a channel. At-most-once: no retry, the caller
    /// logs and moves on when this fails.
    pub async fn trigger(
        &self,
        channel: &str,
        event: &str,
        data: &serde_json::Value,
    ) -> Result<(), PusherError> {
        let body = serde_json::to_string(&serde_json::json!({
            "name": event,
            "channels": [channel],
            "data": data.to_string(),
        }))?;
        let url = self.signed_event_url(&body, chrono::Utc::now().timestamp());

        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(PusherError::Status(resp.status().as_u16()));
        }
        Ok(())
    }

    /// Private-channel auth payload for a connected client, per the Pusher
    /// auth protocol: `key:hmac_sha256(secret, "socket_id:channel")`.
    pub fn authenticate_channel(&self, socket_id: &str, channel: &str) -> String {
        let signature = self.sign(&format!("{}:{}", socket_id, channel));
        format!("{}:{}", self.key, signature)
    }
}
