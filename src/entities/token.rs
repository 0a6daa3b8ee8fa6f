use sea_orm::entity::prelude::*;
use sea_orm::Select;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub token: String,
    pub owner: String,
    pub create_dm: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Non-null marks the token soft-deleted; the row stays for audit and
    /// to keep the identifier burned.
    pub deleted_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Entity {
    /// The one read path for live tokens. Soft-deleted rows are invisible
    /// everywhere except the identifier-reuse check on upsert.
    pub fn find_active(token_id: &str) -> Select<Entity> {
        Self::find()
            .filter(Column::Token.eq(token_id))
            .filter(Column::DeletedAt.is_null())
    }
}
