use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per successful redemption. Not backed by a unique constraint on
/// (user, token_id); the engine's pre-check is best effort under races.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accepted")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user: String,
    pub token_id: String,
    /// Newline-joined per-room invitation failures, truncated to 1024 chars.
    pub errors: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
