pub use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

pub use chrono::{NaiveDateTime as DateTime, TimeDelta, Utc};
pub use dashmap::DashMap;
pub use migration::MigratorTrait;
pub use sea_orm::{
  ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection,
  EntityTrait, IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter,
  QueryOrder, QuerySelect, Set, TransactionTrait,
};
pub use tracing::{debug, error, info, trace, warn};

pub use crate::{
  error::{Error, Result},
  messenger::{Messenger, MessengerError},
  plans::PlanSet,
};

pub fn now() -> DateTime {
  Utc::now().naive_utc()
}
