use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::subscriber;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "authorized_users")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub telegram_id: i64,
  pub subscriber_id: i32,
  pub authorized: bool,
  pub authorized_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "subscriber::Entity",
    from = "Column::SubscriberId",
    to = "subscriber::Column::Id",
    on_delete = "Cascade"
  )]
  Subscriber,
}

impl Related<subscriber::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Subscriber.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
