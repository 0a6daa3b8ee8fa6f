use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::{accepted, token, token_room};
use crate::error::ApiError;
use crate::homeserver::HomeserverApi;
use crate::models::{InviterInfo, TokenInfoResponse, TokenQuery};
use crate::routes::require_auth;
use crate::state::AppState;

/// GET /info?token= — redemption preview shown before the user commits.
pub async fn get_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TokenQuery>,
) -> Result<Json<TokenInfoResponse>, ApiError> {
    let requester = require_auth(&state, &headers).await?;
    let token_id = params.token.ok_or(ApiError::MissingParam("token"))?;

    let info = token_info(
        &state.db,
        state.homeserver.as_ref(),
        &requester.user_id,
        &token_id,
    )
    .await?;
    Ok(Json(info))
}

pub(crate) async fn token_info(
    db: &DatabaseConnection,
    homeserver: &dyn HomeserverApi,
    user_id: &str,
    token_id: &str,
) -> Result<TokenInfoResponse, ApiError> {
    // deleted and unknown tokens are indistinguishable here
    let token = token::Entity::find_active(token_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound)?;

    let has_redeemed = accepted::Entity::find()
        .filter(accepted::Column::User.eq(user_id))
        .filter(accepted::Column::TokenId.eq(token_id))
        .one(db)
        .await?
        .is_some();

    let mut rooms_count = token_room::Entity::find()
        .filter(token_room::Column::Token.eq(token_id))
        .count(db)
        .await?;
    if token.create_dm {
        rooms_count += 1;
    }

    let profile = homeserver.get_profile(&token.owner).await?;

    Ok(TokenInfoResponse {
        rooms_count,
        has_redeemed,
        create_dm: token.create_dm,
        inviter: InviterInfo {
            user_id: token.owner,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
        },
    })
}
