use sea_orm::{ConnectionTrait, sea_query::Expr};

use crate::{
  entity::{LogAction, authorization_log, authorized_user, subscriber},
  prelude::*,
};

/// Appends an audit row on `conn`, usually the caller's open transaction.
pub async fn log<C: ConnectionTrait>(
  conn: &C,
  telegram_id: Option<i64>,
  subscriber_id: Option<i32>,
  action: LogAction,
  context: impl Into<String>,
) -> Result<()> {
  let context = context.into();
  authorization_log::ActiveModel {
    telegram_id: Set(telegram_id),
    subscriber_id: Set(subscriber_id),
    action: Set(action),
    context: Set((!context.is_empty()).then_some(context)),
    timestamp: Set(now()),
    ..Default::default()
  }
  .insert(conn)
  .await?;
  Ok(())
}

/// Bindings between Telegram identities and subscribers.
pub struct Authorizations<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Authorizations<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Binds `telegram_id` to the subscriber, replacing any previous binding.
  pub async fn authorize(
    &self,
    telegram_id: i64,
    subscriber_id: i32,
    context: &str,
  ) -> Result<authorized_user::Model> {
    let txn = self.db.begin().await?;

    let existing = authorized_user::Entity::find()
      .filter(authorized_user::Column::TelegramId.eq(telegram_id))
      .one(&txn)
      .await?;

    let user = match existing {
      Some(user) => {
        authorized_user::ActiveModel {
          subscriber_id: Set(subscriber_id),
          authorized: Set(true),
          authorized_at: Set(now()),
          ..user.into()
        }
        .update(&txn)
        .await?
      }
      None => {
        authorized_user::ActiveModel {
          telegram_id: Set(telegram_id),
          subscriber_id: Set(subscriber_id),
          authorized: Set(true),
          authorized_at: Set(now()),
          ..Default::default()
        }
        .insert(&txn)
        .await?
      }
    };

    log(&txn, Some(telegram_id), Some(subscriber_id), LogAction::Authorized, context)
      .await?;
    txn.commit().await?;

    info!("telegram user {telegram_id} bound to subscriber {subscriber_id}");
    Ok(user)
  }

  pub async fn by_telegram_id(
    &self,
    telegram_id: i64,
  ) -> Result<Option<authorized_user::Model>> {
    let user = authorized_user::Entity::find()
      .filter(authorized_user::Column::TelegramId.eq(telegram_id))
      .one(self.db)
      .await?;
    Ok(user)
  }

  /// Binding together with the subscriber it points to.
  pub async fn with_subscriber(
    &self,
    telegram_id: i64,
  ) -> Result<Option<(authorized_user::Model, subscriber::Model)>> {
    let found = authorized_user::Entity::find()
      .filter(authorized_user::Column::TelegramId.eq(telegram_id))
      .find_also_related(subscriber::Entity)
      .one(self.db)
      .await?;
    Ok(found.and_then(|(user, sub)| sub.map(|sub| (user, sub))))
  }

  pub async fn by_subscriber(
    &self,
    subscriber_id: i32,
  ) -> Result<Vec<authorized_user::Model>> {
    let users = authorized_user::Entity::find()
      .filter(authorized_user::Column::SubscriberId.eq(subscriber_id))
      .all(self.db)
      .await?;
    Ok(users)
  }

  pub async fn set_authorized(
    &self,
    telegram_id: i64,
    authorized: bool,
  ) -> Result<()> {
    authorized_user::Entity::update_many()
      .col_expr(authorized_user::Column::Authorized, Expr::value(authorized))
      .filter(authorized_user::Column::TelegramId.eq(telegram_id))
      .exec(self.db)
      .await?;
    Ok(())
  }

  /// Still-authorized identities bound to an inactive subscriber.
  pub async fn stale(&self) -> Result<Vec<(authorized_user::Model, subscriber::Model)>> {
    let rows = authorized_user::Entity::find()
      .filter(authorized_user::Column::Authorized.eq(true))
      .find_also_related(subscriber::Entity)
      .all(self.db)
      .await?;

    Ok(
      rows
        .into_iter()
        .filter_map(|(user, sub)| sub.map(|sub| (user, sub)))
        .filter(|(_, sub)| !sub.is_active())
        .collect(),
    )
  }

  /// Most recent audit rows first.
  pub async fn logs(&self, limit: u64) -> Result<Vec<authorization_log::Model>> {
    let logs = authorization_log::Entity::find()
      .order_by_desc(authorization_log::Column::Id)
      .limit(limit)
      .all(self.db)
      .await?;
    Ok(logs)
  }

  pub async fn logs_for_subscriber(
    &self,
    subscriber_id: i32,
  ) -> Result<Vec<authorization_log::Model>> {
    let logs = authorization_log::Entity::find()
      .filter(authorization_log::Column::SubscriberId.eq(subscriber_id))
      .order_by_asc(authorization_log::Column::Id)
      .all(self.db)
      .await?;
    Ok(logs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{Subscribers, subscriber::NewSubscriber, test_utils::test_db};

  async fn subscriber(db: &DatabaseConnection, email: &str) -> subscriber::Model {
    Subscribers::new(db)
      .create(NewSubscriber {
        name: "Test".into(),
        email: email.into(),
        phone: "11912345678".into(),
        plans: PlanSet::from_raw("VIP"),
        ..Default::default()
      })
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_authorize_creates_then_rebinds() {
    let db = test_db::setup().await;
    let auth = Authorizations::new(&db);
    let first = subscriber(&db, "a@b.com").await;
    let second = subscriber(&db, "c@d.com").await;

    let user = auth.authorize(100, first.id, "verified").await.unwrap();
    assert!(user.authorized);

    auth.set_authorized(100, false).await.unwrap();
    let user = auth.authorize(100, second.id, "verified").await.unwrap();
    assert!(user.authorized);
    assert_eq!(user.subscriber_id, second.id);

    let all = authorized_user::Entity::find().all(&db).await.unwrap();
    assert_eq!(all.len(), 1);

    let logs = auth.logs(10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.action == LogAction::Authorized));
    assert_eq!(logs[0].subscriber_id, Some(second.id));
  }

  #[tokio::test]
  async fn test_with_subscriber_and_stale() {
    let db = test_db::setup().await;
    let auth = Authorizations::new(&db);
    let sub = subscriber(&db, "a@b.com").await;

    assert!(auth.with_subscriber(100).await.unwrap().is_none());
    auth.authorize(100, sub.id, "").await.unwrap();

    let (user, found) = auth.with_subscriber(100).await.unwrap().unwrap();
    assert_eq!(user.telegram_id, 100);
    assert_eq!(found.email, "a@b.com");
    assert!(auth.stale().await.unwrap().is_empty());

    subscriber::ActiveModel {
      status: Set(crate::entity::SubscriberStatus::Inactive),
      ..found.into()
    }
    .update(&db)
    .await
    .unwrap();

    let stale = auth.stale().await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].0.telegram_id, 100);
  }

  #[tokio::test]
  async fn test_empty_context_is_null() {
    let db = test_db::setup().await;
    log(&db, None, None, LogAction::Revoked, "").await.unwrap();
    let logs = Authorizations::new(&db).logs(1).await.unwrap();
    assert_eq!(logs[0].context, None);
    assert_eq!(logs[0].telegram_id, None);
  }
}
