use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::invite_link;

/// Channel plan that grants access to every active subscriber.
pub const WILDCARD_PLAN: &str = "all";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "channels")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  pub chat_id: Option<String>,
  pub description: Option<String>,
  pub plan: String,
  pub active: bool,
  pub ordering: i32,
  pub creates_join_request: bool,
  pub created_at: DateTime,
}

impl Model {
  pub fn is_wildcard(&self) -> bool {
    self.plan.trim().eq_ignore_ascii_case(WILDCARD_PLAN)
  }

  /// Configured external destination, if any.
  pub fn destination(&self) -> Option<&str> {
    self.chat_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "invite_link::Entity")]
  InviteLinks,
}

impl Related<invite_link::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::InviteLinks.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
