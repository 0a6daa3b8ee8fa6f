pub mod info;
pub mod redeem;
pub mod share_link;
pub mod tokens;

use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::homeserver::Requester;
use crate::state::AppState;

/// Resolve the authenticated requester from the Authorization header via
/// the homeserver. Guests are rejected on every endpoint.
pub async fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<Requester, ApiError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let access_token = auth.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

    let requester = state
        .homeserver
        .whoami(access_token)
        .await
        .map_err(|err| {
            tracing::debug!("whoami rejected request: {err}");
            ApiError::Unauthorized
        })?;

    if requester.is_guest {
        return Err(ApiError::GuestAccess);
    }
    Ok(requester)
}
