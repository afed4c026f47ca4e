use crate::{
  entity::{channel, invite_link},
  prelude::*,
};

#[derive(Debug, Clone, Default)]
pub struct NewChannel {
  pub name: String,
  pub chat_id: Option<String>,
  pub description: Option<String>,
  pub plan: String,
  pub ordering: i32,
  pub creates_join_request: bool,
}

pub struct Channels<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Channels<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn all(&self) -> Result<Vec<channel::Model>> {
    let channels = channel::Entity::find()
      .order_by_asc(channel::Column::Ordering)
      .order_by_asc(channel::Column::Id)
      .all(self.db)
      .await?;
    Ok(channels)
  }

  pub async fn by_id(&self, id: i32) -> Result<channel::Model> {
    channel::Entity::find_by_id(id)
      .one(self.db)
      .await?
      .ok_or(Error::ChannelNotFound)
  }

  pub async fn create(&self, new: NewChannel) -> Result<channel::Model> {
    let name = new.name.trim().to_string();
    let plan = new.plan.trim().to_string();
    if name.is_empty() || plan.is_empty() {
      return Err(Error::InvalidArgs("Channel name and plan are required".into()));
    }

    let channel = channel::ActiveModel {
      name: Set(name),
      chat_id: Set(new.chat_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())),
      description: Set(new.description),
      plan: Set(plan),
      active: Set(true),
      ordering: Set(new.ordering),
      creates_join_request: Set(new.creates_join_request),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    info!("channel `{}` created for plan `{}`", channel.name, channel.plan);
    Ok(channel)
  }

  pub async fn set_active(&self, id: i32, active: bool) -> Result<channel::Model> {
    let channel = self.by_id(id).await?;
    let channel = channel::ActiveModel { active: Set(active), ..channel.into() }
      .update(self.db)
      .await?;
    Ok(channel)
  }

  /// Deleting a channel drops its invite history with it.
  pub async fn delete(&self, id: i32) -> Result<()> {
    let result = channel::Entity::delete_by_id(id).exec(self.db).await?;
    if result.rows_affected == 0 {
      return Err(Error::ChannelNotFound);
    }
    Ok(())
  }

  /// Active channels granted by any of `plans` (ignoring case) plus the
  /// wildcard ones, in display order.
  pub async fn for_plans(&self, plans: &PlanSet) -> Result<Vec<channel::Model>> {
    Ok(
      self
        .active()
        .await?
        .into_iter()
        .filter(|c| c.is_wildcard() || plans.contains_ci(&c.plan))
        .collect(),
    )
  }

  /// Active channels tied to one of `plans`, wildcard channels excluded.
  pub async fn for_plans_exact(&self, plans: &PlanSet) -> Result<Vec<channel::Model>> {
    Ok(
      self
        .active()
        .await?
        .into_iter()
        .filter(|c| !c.is_wildcard() && plans.contains_ci(&c.plan))
        .collect(),
    )
  }

  /// Active channels `telegram_id` has ever been invited to.
  pub async fn invited_to(&self, telegram_id: i64) -> Result<Vec<channel::Model>> {
    let ids: HashSet<i32> = invite_link::Entity::find()
      .filter(invite_link::Column::TelegramId.eq(telegram_id))
      .all(self.db)
      .await?
      .into_iter()
      .map(|link| link.channel_id)
      .collect();

    Ok(self.active().await?.into_iter().filter(|c| ids.contains(&c.id)).collect())
  }

  async fn active(&self) -> Result<Vec<channel::Model>> {
    let channels = channel::Entity::find()
      .filter(channel::Column::Active.eq(true))
      .order_by_asc(channel::Column::Ordering)
      .order_by_asc(channel::Column::Id)
      .all(self.db)
      .await?;
    Ok(channels)
  }
}

#[cfg(test)]
pub mod tests {
  use super::*;
  use crate::sv::test_utils::test_db;

  pub async fn channel(
    db: &DatabaseConnection,
    name: &str,
    chat_id: Option<&str>,
    plan: &str,
    ordering: i32,
  ) -> channel::Model {
    Channels::new(db)
      .create(NewChannel {
        name: name.into(),
        chat_id: chat_id.map(Into::into),
        plan: plan.into(),
        ordering,
        ..Default::default()
      })
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_for_plans_ordering_and_wildcard() {
    let db = test_db::setup().await;
    let sv = Channels::new(&db);

    channel(&db, "Lite", Some("-1003"), "Lite", 3).await;
    channel(&db, "Community", Some("-1001"), "ALL", 1).await;
    channel(&db, "VIP", Some("-1002"), "vip", 2).await;
    let hidden = channel(&db, "Old VIP", Some("-1004"), "VIP", 0).await;
    sv.set_active(hidden.id, false).await.unwrap();

    let names: Vec<_> = sv
      .for_plans(&PlanSet::from_raw("VIP"))
      .await
      .unwrap()
      .into_iter()
      .map(|c| c.name)
      .collect();
    assert_eq!(names, vec!["Community", "VIP"]);

    let exact = sv.for_plans_exact(&PlanSet::from_raw("VIP, Lite")).await.unwrap();
    assert_eq!(exact.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["VIP", "Lite"]);

    let none = sv.for_plans(&PlanSet::new()).await.unwrap();
    assert_eq!(none.len(), 1);
    assert!(none[0].is_wildcard());
  }

  #[tokio::test]
  async fn test_create_validation_and_delete() {
    let db = test_db::setup().await;
    let sv = Channels::new(&db);

    assert!(matches!(
      sv.create(NewChannel { name: "x".into(), ..Default::default() }).await,
      Err(Error::InvalidArgs(_))
    ));

    let c = channel(&db, "VIP", Some("  "), "VIP", 0).await;
    assert_eq!(c.chat_id, None);
    assert_eq!(c.destination(), None);

    sv.delete(c.id).await.unwrap();
    assert!(matches!(sv.delete(c.id).await, Err(Error::ChannelNotFound)));
    assert!(sv.all().await.unwrap().is_empty());
  }
}
