use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::ShareLinkResponse;
use crate::routes::require_auth;
use crate::state::AppState;
use crate::uri::ShareTarget;

/// PUT /share_link/ — derive the content-addressed link for an in-app
/// object and materialize its preview artifact.
pub async fn create_share_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<ShareLinkResponse>, ApiError> {
    let requester = require_auth(&state, &headers).await?;

    // reject unsupported types before any file I/O
    let target = ShareTarget::from_payload(&payload)?;
    let query = payload.get("query");

    let profile = state.homeserver.get_profile(&requester.user_id).await?;
    let canonical = state
        .share_links
        .generate(&target, query, &requester.user_id, &profile)?;

    Ok(Json(ShareLinkResponse {
        url: canonical.url,
        target_uri: canonical.target_uri,
    }))
}
