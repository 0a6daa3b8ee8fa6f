use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::db;
use crate::entities::{accepted, token, token_room};
use crate::error::ApiError;
use crate::homeserver::{HomeserverApi, HomeserverError};
use crate::models::{RedeemResponse, TokenQuery};
use crate::routes::require_auth;
use crate::state::AppState;

/// Cap on the persisted per-room failure log.
const MAX_ERROR_LOG: usize = 1024;

/// POST /redeem?token= — one-time redemption of a token by the caller.
pub async fn redeem(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TokenQuery>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let requester = require_auth(&state, &headers).await?;
    let token_id = params.token.ok_or(ApiError::MissingParam("token"))?;

    let rooms = redeem_token(
        &state.db,
        state.homeserver.as_ref(),
        &requester.user_id,
        &token_id,
    )
    .await?;
    Ok(Json(RedeemResponse { rooms }))
}

/// Drive one redemption attempt: resolve, duplicate-check, fan out over
/// the token's rooms in stored order, optionally create the DM, then
/// record the acceptance.
///
/// Membership calls run before the local write so no transaction spans
/// external I/O. One failing room must not block the rest; failures are
/// collected into the acceptance record instead. The duplicate check is
/// read-then-act and not backed by a unique constraint, so concurrent
/// attempts by the same user can race (accepted, see schema notes).
pub(crate) async fn redeem_token(
    db: &DatabaseConnection,
    homeserver: &dyn HomeserverApi,
    user_id: &str,
    token_id: &str,
) -> Result<Vec<String>, ApiError> {
    let token = token::Entity::find_active(token_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound)?;

    let already = accepted::Entity::find()
        .filter(accepted::Column::User.eq(user_id))
        .filter(accepted::Column::TokenId.eq(token_id))
        .one(db)
        .await?;
    if already.is_some() {
        return Err(ApiError::AlreadyRedeemed);
    }

    if token.owner == user_id {
        return Err(ApiError::CantRedeemOwnToken);
    }

    let associations = token_room::Entity::find()
        .filter(token_room::Column::Token.eq(token_id))
        .order_by_asc(token_room::Column::Id)
        .all(db)
        .await?;

    let mut invited_rooms = Vec::new();
    let mut failures = Vec::new();
    for assoc in associations {
        let room_id = assoc.room;
        match invite_and_join(homeserver, &token.owner, user_id, &room_id).await {
            Ok(()) => invited_rooms.push(room_id),
            Err(err) => {
                tracing::warn!("inviting {user_id} into {room_id} failed: {err}");
                failures.push(format!("{room_id}: '{err}'"));
            }
        }
    }

    if token.create_dm {
        // not caught: a DM failure aborts before any acceptance is recorded
        let dm_room = homeserver.create_dm_room(user_id, &token.owner).await?;
        invited_rooms.push(dm_room);
    }

    let now = db::now();
    accepted::ActiveModel {
        user: Set(user_id.to_string()),
        token_id: Set(token.token.clone()),
        errors: Set(join_errors(&failures)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(invited_rooms)
}

async fn invite_and_join(
    homeserver: &dyn HomeserverApi,
    owner: &str,
    user_id: &str,
    room_id: &str,
) -> Result<(), HomeserverError> {
    homeserver.invite_user(owner, user_id, room_id).await?;
    homeserver.join_room(user_id, room_id).await
}

fn join_errors(failures: &[String]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    Some(failures.join("\n").chars().take(MAX_ERROR_LOG).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homeserver::mock::MockHomeserver;
    use crate::routes::tokens::upsert_token;

    const MEEKO: &str = "@meeko:test";
    const FLIT: &str = "@flit:test";

    fn rooms(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    async fn accepted_rows(db: &DatabaseConnection, token_id: &str) -> Vec<accepted::Model> {
        accepted::Entity::find()
            .filter(accepted::Column::TokenId.eq(token_id))
            .all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_returns_rooms_in_stored_order() {
        let db = db::init_test().await;
        let hs = MockHomeserver::new();
        let room_list = rooms(&["!b:t", "!c:t", "!d:t"]);
        let data = upsert_token(&db, MEEKO, None, false, &room_list).await.unwrap();

        let invited = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap();
        assert_eq!(invited, room_list);

        let rows = accepted_rows(&db, &data.token).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user, FLIT);
        assert_eq!(rows[0].errors, None);

        // invite-as-owner then join, per room, in order
        assert_eq!(
            hs.calls(),
            vec![
                format!("invite:!b:t:{MEEKO}->{FLIT}"),
                format!("join:!b:t:{FLIT}"),
                format!("invite:!c:t:{MEEKO}->{FLIT}"),
                format!("join:!c:t:{FLIT}"),
                format!("invite:!d:t:{MEEKO}->{FLIT}"),
                format!("join:!d:t:{FLIT}"),
            ]
        );
    }

    #[tokio::test]
    async fn test_redeemed_count_shows_up_on_get() {
        let db = db::init_test().await;
        let hs = MockHomeserver::new();
        let data = upsert_token(&db, MEEKO, None, false, &rooms(&["!b:t"])).await.unwrap();

        redeem_token(&db, &hs, FLIT, &data.token).await.unwrap();

        let token = crate::routes::tokens::get_token(&db, MEEKO, &data.token)
            .await
            .unwrap();
        assert_eq!(token.accepted_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_or_deleted_token_is_not_found() {
        let db = db::init_test().await;
        let hs = MockHomeserver::new();
        let err = redeem_token(&db, &hs, FLIT, "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let data = upsert_token(&db, MEEKO, None, false, &[]).await.unwrap();
        crate::routes::tokens::delete_token(&db, MEEKO, &data.token)
            .await
            .unwrap();
        let err = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_owner_cannot_redeem_own_token() {
        let db = db::init_test().await;
        let hs = MockHomeserver::new();
        let data = upsert_token(&db, MEEKO, None, false, &rooms(&["!a:t"])).await.unwrap();

        let err = redeem_token(&db, &hs, MEEKO, &data.token).await.unwrap_err();
        assert!(matches!(err, ApiError::CantRedeemOwnToken));
        assert!(hs.calls().is_empty());
        assert!(accepted_rows(&db, &data.token).await.is_empty());
    }

    #[tokio::test]
    async fn test_second_redemption_is_rejected_without_membership_calls() {
        let db = db::init_test().await;
        let hs = MockHomeserver::new();
        let data = upsert_token(&db, MEEKO, None, false, &rooms(&["!a:t"])).await.unwrap();

        redeem_token(&db, &hs, FLIT, &data.token).await.unwrap();
        let calls_after_first = hs.calls().len();

        let err = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyRedeemed));
        assert_eq!(hs.calls().len(), calls_after_first);
        assert_eq!(accepted_rows(&db, &data.token).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_room_is_recorded_and_skipped() {
        let db = db::init_test().await;
        let hs = MockHomeserver::failing_rooms(&["!bad:t"]);
        let data = upsert_token(&db, MEEKO, None, false, &rooms(&["!a:t", "!bad:t", "!c:t"]))
            .await
            .unwrap();

        let invited = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap();
        assert_eq!(invited, rooms(&["!a:t", "!c:t"]));

        let rows = accepted_rows(&db, &data.token).await;
        assert_eq!(rows.len(), 1);
        let errors = rows[0].errors.as_deref().unwrap();
        assert!(errors.starts_with("!bad:t: '"));
        assert_eq!(errors.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_error_log_is_truncated() {
        let db = db::init_test().await;
        let long_room = format!("!{}:t", "x".repeat(600));
        let other_room = format!("!{}:t", "y".repeat(600));
        let hs = MockHomeserver::failing_rooms(&[&long_room, &other_room]);
        let data = upsert_token(
            &db,
            MEEKO,
            None,
            false,
            &[long_room.clone(), other_room.clone()],
        )
        .await
        .unwrap();

        let invited = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap();
        assert!(invited.is_empty());

        let rows = accepted_rows(&db, &data.token).await;
        assert_eq!(rows[0].errors.as_deref().unwrap().chars().count(), 1024);
    }

    #[tokio::test]
    async fn test_create_dm_appends_new_room() {
        let db = db::init_test().await;
        let hs = MockHomeserver::new();
        let data = upsert_token(&db, MEEKO, None, true, &[]).await.unwrap();

        let invited = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap();
        assert_eq!(invited.len(), 1);
        assert!(invited[0].starts_with("!dm-"));
        assert_eq!(hs.calls(), vec![format!("create_dm:{FLIT}->{MEEKO}")]);

        // second attempt by the same user is blocked
        let err = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyRedeemed));
    }

    #[tokio::test]
    async fn test_dm_failure_aborts_without_acceptance() {
        let db = db::init_test().await;
        let hs = MockHomeserver::failing_dm();
        let data = upsert_token(&db, MEEKO, None, true, &rooms(&["!a:t"])).await.unwrap();

        let err = redeem_token(&db, &hs, FLIT, &data.token).await.unwrap_err();
        assert!(matches!(err, ApiError::Homeserver(_)));
        assert!(accepted_rows(&db, &data.token).await.is_empty());
    }
}
