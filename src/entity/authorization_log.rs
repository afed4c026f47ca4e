use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
  #[sea_orm(string_value = "authorized")]
  Authorized,
  #[sea_orm(string_value = "revoked")]
  Revoked,
}

/// Append-only audit row. `telegram_id` is empty for entries written by the
/// webhook before any identity is bound.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "authorization_logs")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub telegram_id: Option<i64>,
  pub subscriber_id: Option<i32>,
  pub action: LogAction,
  pub context: Option<String>,
  pub timestamp: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
