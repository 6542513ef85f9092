use crate::error::AppError;
use crate::state::AppState;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject - the user id
    pub exp: i64,    // expiration time (unix timestamp)
}

/// Validate token signature and expiry, fail closed on any decode error.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

/// Verify the credential and parse its subject as a user id.
pub fn verify_user_id(token: &str, secret: &str) -> Result<Uuid, AppError> {
    let claims = verify_token(token, secret)?;
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)
}

/// Middleware that extracts the bearer token and stores the caller's user id
/// in request extensions for the `guards::User` extractor.
pub async fn auth_middleware(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user_id = verify_user_id(token, &state.config.jwt_secret)?;

    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(sub: &str, exp: i64, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let id = Uuid::new_v4();
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = make_token(&id.to_string(), exp, "s3cret");
        assert_eq!(verify_user_id(&token, "s3cret").unwrap(), id);
    }

    #[test]
    fn rejects_garbage_token() {
        assert!(matches!(
            verify_token("not_a_jwt", "s3cret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = make_token(&Uuid::new_v4().to_string(), exp, "s3cret");
        assert!(verify_token(&token, "other").is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let exp = chrono::Utc::now().timestamp() - 3600;
        let token = make_token(&Uuid::new_v4().to_string(), exp, "s3cret");
        assert!(verify_token(&token, "s3cret").is_err());
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = make_token("charlie", exp, "s3cret");
        assert!(matches!(
            verify_user_id(&token, "s3cret"),
            Err(AppError::Unauthorized)
        ));
    }
}
