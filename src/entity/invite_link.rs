use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::channel;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_invite_links")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub telegram_id: i64,
  pub channel_id: i32,
  pub link: String,
  pub expire_at: DateTime,
  pub created_at: DateTime,
  pub revoked_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "channel::Entity",
    from = "Column::ChannelId",
    to = "channel::Column::Id",
    on_delete = "Cascade"
  )]
  Channel,
}

impl Related<channel::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Channel.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
