//! Cookie session authentication.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use crate::app::AppState;
use crate::error::ApiError;

/// Account that owns the request's session cookie.
///
/// Rejects with 401 when the cookie is missing or the session is unknown or
/// expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAccount(pub i64);

#[async_trait]
impl FromRequestParts<AppState> for SessionAccount {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.session.cookie_name)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("No session found".to_string()))?;

        let account_id = state
            .stores
            .accounts
            .find_session_account(&token, Utc::now())
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(SessionAccount(account_id))
    }
}
