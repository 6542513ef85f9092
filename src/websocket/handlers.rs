use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use super::session;
use crate::middleware::auth;
use crate::services::user_service::UserService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket handshake. Browsers cannot set custom headers during the
/// upgrade, so the credential is accepted as a `token` query parameter with
/// the bearer header as a fallback. A rejected credential closes the
/// handshake before the socket is ever accepted.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    });
    let Some(token) = token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let user_id = match auth::verify_user_id(&token, &state.config.jwt_secret) {
        Ok(id) => id,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };
    let user = match UserService::get_summary(&state.db, user_id).await {
        Ok(Some(user)) => user,
        // Valid signature but unknown subject: still fail closed.
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(e) => {
            error!(error = %e, "user lookup failed during ws handshake");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    ws.on_upgrade(move |socket| session::run(state, user, socket))
        .into_response()
}
