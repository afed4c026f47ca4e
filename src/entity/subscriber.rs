use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::authorized_user;
use crate::plans::PlanSet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
  #[sea_orm(string_value = "active")]
  #[default]
  Active,
  #[sea_orm(string_value = "inactive")]
  Inactive,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum Origin {
  #[sea_orm(string_value = "manual")]
  #[default]
  Manual,
  #[sea_orm(string_value = "hotmart")]
  Hotmart,
  #[sea_orm(string_value = "import")]
  Import,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscribers")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  #[sea_orm(unique)]
  pub email: String,
  pub phone: String,
  /// Comma-joined plan names, see [`PlanSet`].
  pub plans: String,
  pub status: SubscriberStatus,
  pub origin: Origin,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

impl Model {
  pub fn plan_set(&self) -> PlanSet {
    PlanSet::from_raw(&self.plans)
  }

  pub fn is_active(&self) -> bool {
    self.status == SubscriberStatus::Active
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "authorized_user::Entity")]
  AuthorizedUsers,
}

impl Related<authorized_user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::AuthorizedUsers.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
