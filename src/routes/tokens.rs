use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde_json::{json, Value};

use crate::db;
use crate::entities::{accepted, room, token, token_room};
use crate::error::ApiError;
use crate::models::{RegistrationTokenInfo, TokenData, TokenQuery, UpsertTokenRequest, UpsertTokenResponse};
use crate::routes::require_auth;
use crate::state::AppState;
use crate::token::{can_edit, generate_token_id};

// ─── HTTP handlers ───

/// GET /tokens — list the caller's tokens, or fetch one via `?token=`.
pub async fn get_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TokenQuery>,
) -> Result<Json<Value>, ApiError> {
    let requester = require_auth(&state, &headers).await?;

    if let Some(token_id) = params.token {
        let token = get_token(&state.db, &requester.user_id, &token_id).await?;
        return Ok(Json(json!({ "token": token })));
    }

    let tokens = list_tokens(&state.db, &requester.user_id).await?;
    Ok(Json(json!({ "tokens": tokens })))
}

/// POST /tokens — create or overwrite a token, optionally mirroring it
/// into the homeserver registration-token store.
pub async fn upsert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpsertTokenRequest>,
) -> Result<Json<UpsertTokenResponse>, ApiError> {
    let requester = require_auth(&state, &headers).await?;

    let token = upsert_token(
        &state.db,
        &requester.user_id,
        req.token,
        req.create_dm,
        &req.rooms,
    )
    .await?;
    let registration_token =
        registration_bridge(&state, req.as_registration_token, &token.token).await?;

    Ok(Json(UpsertTokenResponse {
        token,
        registration_token,
    }))
}

/// DELETE /tokens?token= — soft-delete a token the caller owns.
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TokenQuery>,
) -> Result<Json<Value>, ApiError> {
    let requester = require_auth(&state, &headers).await?;
    let token_id = params.token.ok_or(ApiError::MissingParam("token"))?;
    delete_token(&state.db, &requester.user_id, &token_id).await?;
    Ok(Json(json!({})))
}

// ─── Token manager ───

pub(crate) async fn serialize_token<C: ConnectionTrait>(
    conn: &C,
    model: &token::Model,
) -> Result<TokenData, sea_orm::DbErr> {
    let rooms = token_room::Entity::find()
        .filter(token_room::Column::Token.eq(&model.token))
        .order_by_asc(token_room::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(|assoc| assoc.room)
        .collect();
    let accepted_count = accepted::Entity::find()
        .filter(accepted::Column::TokenId.eq(&model.token))
        .count(conn)
        .await?;
    Ok(TokenData {
        token: model.token.clone(),
        create_dm: model.create_dm,
        accepted_count,
        rooms,
    })
}

pub(crate) async fn list_tokens(
    db: &DatabaseConnection,
    owner: &str,
) -> Result<Vec<TokenData>, ApiError> {
    let models = token::Entity::find()
        .filter(token::Column::Owner.eq(owner))
        .filter(token::Column::DeletedAt.is_null())
        .order_by_asc(token::Column::CreatedAt)
        .all(db)
        .await?;

    let mut tokens = Vec::with_capacity(models.len());
    for model in &models {
        tokens.push(serialize_token(db, model).await?);
    }
    Ok(tokens)
}

pub(crate) async fn get_token(
    db: &DatabaseConnection,
    requester: &str,
    token_id: &str,
) -> Result<TokenData, ApiError> {
    let model = token::Entity::find_active(token_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !can_edit(&model, requester) {
        return Err(ApiError::Forbidden);
    }
    Ok(serialize_token(db, &model).await?)
}

/// Create or fully overwrite a token. Room set and create_dm are replaced,
/// never merged. Runs in one transaction; either everything lands or
/// nothing does.
pub(crate) async fn upsert_token(
    db: &DatabaseConnection,
    owner: &str,
    token_id: Option<String>,
    create_dm: bool,
    rooms: &[String],
) -> Result<TokenData, ApiError> {
    let txn = db.begin().await?;
    let now = db::now();

    // get-or-create every referenced room before association
    for name in rooms {
        let existing = room::Entity::find_by_id(name.clone()).one(&txn).await?;
        if existing.is_none() {
            room::ActiveModel {
                name_or_alias: Set(name.clone()),
                created_at: Set(now.clone()),
                updated_at: Set(now.clone()),
            }
            .insert(&txn)
            .await?;
        }
    }

    let model = match &token_id {
        Some(id) => match token::Entity::find_by_id(id.clone()).one(&txn).await? {
            // deleted identifiers are burned for good
            Some(existing) if existing.deleted_at.is_some() => {
                return Err(ApiError::Forbidden);
            }
            Some(existing) => {
                if !can_edit(&existing, owner) {
                    return Err(ApiError::Forbidden);
                }
                let mut active: token::ActiveModel = existing.into();
                active.create_dm = Set(create_dm);
                active.updated_at = Set(now.clone());
                let updated = active.update(&txn).await?;
                token_room::Entity::delete_many()
                    .filter(token_room::Column::Token.eq(id))
                    .exec(&txn)
                    .await?;
                updated
            }
            None => insert_token(&txn, Some(id.clone()), owner, create_dm, &now).await?,
        },
        None => insert_token(&txn, None, owner, create_dm, &now).await?,
    };

    for name in rooms {
        token_room::ActiveModel {
            token: Set(model.token.clone()),
            room: Set(name.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let data = serialize_token(&txn, &model).await?;
    txn.commit().await?;
    Ok(data)
}

async fn insert_token<C: ConnectionTrait>(
    conn: &C,
    token_id: Option<String>,
    owner: &str,
    create_dm: bool,
    now: &str,
) -> Result<token::Model, sea_orm::DbErr> {
    token::ActiveModel {
        token: Set(token_id.unwrap_or_else(generate_token_id)),
        owner: Set(owner.to_string()),
        create_dm: Set(create_dm),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
        deleted_at: Set(None),
    }
    .insert(conn)
    .await
}

pub(crate) async fn delete_token(
    db: &DatabaseConnection,
    requester: &str,
    token_id: &str,
) -> Result<(), ApiError> {
    let model = token::Entity::find_active(token_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound)?;
    if !can_edit(&model, requester) {
        return Err(ApiError::Forbidden);
    }

    let now = db::now();
    let mut active: token::ActiveModel = model.into();
    active.deleted_at = Set(Some(now.clone()));
    active.updated_at = Set(now);
    active.update(db).await?;
    Ok(())
}

// ─── Registration-token bridge ───

/// Mirror the token into the homeserver's registration-token store so the
/// same identifier also admits new accounts during sign-up.
pub(crate) async fn registration_bridge(
    state: &AppState,
    requested: bool,
    token_id: &str,
) -> Result<RegistrationTokenInfo, ApiError> {
    if !requested {
        return Ok(RegistrationTokenInfo::invalid("NOT_REQUESTED"));
    }
    if !state.config.generate_registration_token {
        return Ok(RegistrationTokenInfo::invalid("NOT_ENABLED"));
    }

    if !state.homeserver.registration_token_exists(token_id).await? {
        state.homeserver.create_registration_token(token_id).await?;
        tracing::info!("mirrored super invite {token_id} as registration token");
    }
    Ok(RegistrationTokenInfo::valid())
}
