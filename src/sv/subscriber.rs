use std::collections::BTreeMap;

use sea_orm::sea_query::Expr;
use serde::Serialize;

use super::{RevokeScope, authorization::log};
use crate::{
  entity::{
    LogAction, Origin, SubscriberStatus, authorized_user, subscriber,
  },
  phone,
  prelude::*,
};

pub fn normalize_email(raw: &str) -> String {
  raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct NewSubscriber {
  pub name: String,
  pub email: String,
  pub phone: String,
  pub plans: PlanSet,
  /// Ignored by activations, which always record the payment platform.
  pub origin: Origin,
}

/// Admin edit; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct SubscriberUpdate {
  pub name: Option<String>,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub plans: Option<PlanSet>,
  pub status: Option<SubscriberStatus>,
}

/// A committed subscriber mutation and the identities it affects.
#[derive(Debug, Clone)]
pub struct Change {
  pub before: subscriber::Model,
  pub after: subscriber::Model,
  pub telegram_ids: Vec<i64>,
}

impl Change {
  pub fn removed_plans(&self) -> PlanSet {
    PlanSet::diff_removed(&self.before.plan_set(), &self.after.plan_set())
  }

  /// Access that must be withdrawn from the bound identities.
  pub fn revocation(&self) -> Option<RevokeScope> {
    match (self.before.is_active(), self.after.is_active()) {
      (true, false) => Some(RevokeScope::Full),
      (_, true) => {
        let removed = self.removed_plans();
        (!removed.is_empty()).then_some(RevokeScope::Plans(removed))
      }
      (false, false) => None,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
  pub authorized_users: u64,
  pub active_subscribers: u64,
  pub total_subscribers: u64,
  /// Authorized identities per plan; a subscriber with several plans counts
  /// once under each.
  pub by_plan: BTreeMap<String, u64>,
}

pub struct Subscribers<'a> {
  db: &'a DatabaseConnection,
}

impl<'a> Subscribers<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<subscriber::Model>> {
    Ok(subscriber::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_email(&self, email: &str) -> Result<Option<subscriber::Model>> {
    let subscriber = subscriber::Entity::find()
      .filter(subscriber::Column::Email.eq(normalize_email(email)))
      .one(self.db)
      .await?;
    Ok(subscriber)
  }

  pub async fn all(&self) -> Result<Vec<subscriber::Model>> {
    let all = subscriber::Entity::find()
      .order_by_desc(subscriber::Column::CreatedAt)
      .order_by_desc(subscriber::Column::Id)
      .all(self.db)
      .await?;
    Ok(all)
  }

  /// Active subscriber whose email matches exactly and whose stored phone
  /// matches `phone` tolerantly. Both must hold.
  pub async fn find_by_email_and_phone(
    &self,
    email: &str,
    phone: &str,
  ) -> Result<Option<subscriber::Model>> {
    let email = normalize_email(email);
    if email.is_empty() {
      return Ok(None);
    }

    let candidates = subscriber::Entity::find()
      .filter(subscriber::Column::Email.eq(email))
      .filter(subscriber::Column::Status.eq(SubscriberStatus::Active))
      .all(self.db)
      .await?;

    Ok(candidates.into_iter().find(|s| phone::matches(&s.phone, phone)))
  }

  /// Admin entry or bulk import.
  pub async fn create(&self, new: NewSubscriber) -> Result<subscriber::Model> {
    let email = normalize_email(&new.email);
    if email.is_empty() {
      return Err(Error::InvalidArgs("Email is required".into()));
    }
    if self.by_email(&email).await?.is_some() {
      return Err(Error::InvalidArgs(format!("Subscriber {email} already exists")));
    }

    let now = now();
    let name = new.name.trim();
    let subscriber = subscriber::ActiveModel {
      name: Set(if name.is_empty() { email.clone() } else { name.to_string() }),
      email: Set(email),
      phone: Set(phone::normalize(&new.phone)),
      plans: Set(new.plans.format()),
      status: Set(SubscriberStatus::Active),
      origin: Set(new.origin),
      created_at: Set(now),
      updated_at: Set(now),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    Ok(subscriber)
  }

  /// Creates or reactivates the subscriber for `new.email`, merging the
  /// incoming plans into the ones already held.
  pub async fn upsert_from_activation(
    &self,
    new: NewSubscriber,
    context: &str,
  ) -> Result<subscriber::Model> {
    let email = normalize_email(&new.email);
    if email.is_empty() {
      return Err(Error::InvalidArgs("Email is required".into()));
    }
    let name = new.name.trim().to_string();
    let phone = phone::normalize(&new.phone);

    let txn = self.db.begin().await?;
    let now = now();

    let existing = subscriber::Entity::find()
      .filter(subscriber::Column::Email.eq(email.as_str()))
      .one(&txn)
      .await?;

    let subscriber = match existing {
      Some(current) => {
        let plans = current.plan_set().merge(&new.plans);
        let name = if name.is_empty() { current.name.clone() } else { name };
        let phone = if phone.is_empty() { current.phone.clone() } else { phone };

        subscriber::ActiveModel {
          name: Set(name),
          phone: Set(phone),
          plans: Set(plans.format()),
          status: Set(SubscriberStatus::Active),
          origin: Set(Origin::Hotmart),
          updated_at: Set(now),
          ..current.into()
        }
        .update(&txn)
        .await?
      }
      None => {
        subscriber::ActiveModel {
          name: Set(if name.is_empty() { email.clone() } else { name }),
          email: Set(email),
          phone: Set(phone),
          plans: Set(new.plans.format()),
          status: Set(SubscriberStatus::Active),
          origin: Set(Origin::Hotmart),
          created_at: Set(now),
          updated_at: Set(now),
          ..Default::default()
        }
        .insert(&txn)
        .await?
      }
    };

    log(&txn, None, Some(subscriber.id), LogAction::Authorized, context).await?;
    txn.commit().await?;

    Ok(subscriber)
  }

  /// With `plan`, removes only that plan and deactivates once none remain.
  /// Without it, deactivates outright and leaves the plans untouched.
  /// Unknown emails yield `None`.
  pub async fn deactivate_by_email(
    &self,
    email: &str,
    plan: Option<&str>,
    context: &str,
  ) -> Result<Option<Change>> {
    let email = normalize_email(email);
    if email.is_empty() {
      return Ok(None);
    }

    let txn = self.db.begin().await?;

    let Some(before) = subscriber::Entity::find()
      .filter(subscriber::Column::Email.eq(email.as_str()))
      .one(&txn)
      .await?
    else {
      txn.commit().await?;
      return Ok(None);
    };

    let mut plans = before.plan_set();
    let status = match plan {
      Some(plan) => {
        if plans.remove_ci(plan).is_empty() {
          warn!("{email} does not hold plan `{plan}`, plans left unchanged");
        }
        if plans.is_empty() { SubscriberStatus::Inactive } else { before.status }
      }
      None => SubscriberStatus::Inactive,
    };

    let changed = status != before.status || plans != before.plan_set();
    let after = if changed {
      let after = subscriber::ActiveModel {
        plans: Set(plans.format()),
        status: Set(status),
        updated_at: Set(now()),
        ..before.clone().into()
      }
      .update(&txn)
      .await?;
      log(&txn, None, Some(after.id), LogAction::Revoked, context).await?;
      after
    } else {
      before.clone()
    };

    let telegram_ids = bound_identities(&txn, before.id).await?;
    txn.commit().await?;

    Ok(Some(Change { before, after, telegram_ids }))
  }

  /// Admin edit. Reactivation re-enables bound identities in the same
  /// transaction; withdrawal of access is left to the caller.
  pub async fn update(&self, id: i32, update: SubscriberUpdate) -> Result<Change> {
    let txn = self.db.begin().await?;

    let before = subscriber::Entity::find_by_id(id)
      .one(&txn)
      .await?
      .ok_or(Error::SubscriberNotFound)?;

    let mut model: subscriber::ActiveModel = before.clone().into();
    if let Some(name) = update.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
      model.name = Set(name);
    }
    if let Some(email) = update.email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty()) {
      model.email = Set(email);
    }
    if let Some(phone) = update.phone {
      model.phone = Set(phone::normalize(&phone));
    }
    if let Some(plans) = &update.plans {
      model.plans = Set(plans.format());
    }
    if let Some(status) = update.status {
      model.status = Set(status);
    }
    model.updated_at = Set(now());
    let after = model.update(&txn).await?;

    let telegram_ids = bound_identities(&txn, id).await?;

    match (before.is_active(), after.is_active()) {
      (false, true) => {
        authorized_user::Entity::update_many()
          .col_expr(authorized_user::Column::Authorized, Expr::value(true))
          .filter(authorized_user::Column::SubscriberId.eq(id))
          .exec(&txn)
          .await?;
        for &telegram_id in &telegram_ids {
          log(&txn, Some(telegram_id), Some(id), LogAction::Authorized, "reactivated by admin")
            .await?;
        }
      }
      (true, false) => {
        log(&txn, None, Some(id), LogAction::Revoked, "deactivated by admin").await?;
      }
      _ => {}
    }

    txn.commit().await?;
    Ok(Change { before, after, telegram_ids })
  }

  /// Deletes the subscriber and its bindings. Access must already be revoked.
  pub async fn delete(&self, id: i32, context: &str) -> Result<Option<subscriber::Model>> {
    let txn = self.db.begin().await?;

    let Some(subscriber) = subscriber::Entity::find_by_id(id).one(&txn).await? else {
      txn.commit().await?;
      return Ok(None);
    };

    let telegram_ids = bound_identities(&txn, id).await?;
    if telegram_ids.is_empty() {
      log(&txn, None, Some(id), LogAction::Revoked, context).await?;
    }
    for &telegram_id in &telegram_ids {
      log(&txn, Some(telegram_id), Some(id), LogAction::Revoked, context).await?;
    }

    authorized_user::Entity::delete_many()
      .filter(authorized_user::Column::SubscriberId.eq(id))
      .exec(&txn)
      .await?;
    subscriber::Entity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    Ok(Some(subscriber))
  }

  pub async fn stats(&self) -> Result<Stats> {
    let total_subscribers = subscriber::Entity::find().count(self.db).await?;
    let active_subscribers = subscriber::Entity::find()
      .filter(subscriber::Column::Status.eq(SubscriberStatus::Active))
      .count(self.db)
      .await?;

    let authorized = authorized_user::Entity::find()
      .filter(authorized_user::Column::Authorized.eq(true))
      .find_also_related(subscriber::Entity)
      .all(self.db)
      .await?;

    let mut by_plan = BTreeMap::new();
    for sub in authorized.iter().filter_map(|(_, sub)| sub.as_ref()) {
      for plan in sub.plan_set().iter() {
        *by_plan.entry(plan.to_string()).or_insert(0) += 1;
      }
    }

    Ok(Stats {
      authorized_users: authorized.len() as u64,
      active_subscribers,
      total_subscribers,
      by_plan,
    })
  }
}

async fn bound_identities<C: ConnectionTrait>(conn: &C, subscriber_id: i32) -> Result<Vec<i64>> {
  let users = authorized_user::Entity::find()
    .filter(authorized_user::Column::SubscriberId.eq(subscriber_id))
    .all(conn)
    .await?;
  Ok(users.into_iter().map(|u| u.telegram_id).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::{Authorizations, test_utils::test_db};

  fn activation(email: &str, plan: &str) -> NewSubscriber {
    NewSubscriber {
      name: "Ana".into(),
      email: email.into(),
      phone: "+55 (11) 91234-5678".into(),
      plans: PlanSet::from_raw(plan),
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_activation_is_idempotent() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);

    let first = sv.upsert_from_activation(activation("A@B.com ", "VIP"), "").await.unwrap();
    let second = sv.upsert_from_activation(activation("a@b.com", "VIP"), "").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.email, "a@b.com");
    assert_eq!(second.phone, "5511912345678");
    assert_eq!(second.plan_set(), PlanSet::from_raw("VIP"));
    assert_eq!(sv.all().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_plan_merge_and_partial_deactivation() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);

    sv.upsert_from_activation(activation("e@x.com", "A"), "").await.unwrap();
    let sub = sv.upsert_from_activation(activation("e@x.com", "B"), "").await.unwrap();
    assert_eq!(sub.plan_set(), PlanSet::from_raw("A, B"));

    let change = sv.deactivate_by_email("e@x.com", Some("a"), "").await.unwrap().unwrap();
    assert_eq!(change.after.plan_set(), PlanSet::from_raw("B"));
    assert!(change.after.is_active());
    assert_eq!(change.revocation(), Some(RevokeScope::Plans(PlanSet::from_raw("A"))));

    let change = sv.deactivate_by_email("e@x.com", Some("B"), "").await.unwrap().unwrap();
    assert!(change.after.plan_set().is_empty());
    assert_eq!(change.after.status, SubscriberStatus::Inactive);
    assert_eq!(change.revocation(), Some(RevokeScope::Full));
  }

  #[tokio::test]
  async fn test_reactivation_merges_into_inactive() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);

    sv.upsert_from_activation(activation("e@x.com", "A"), "").await.unwrap();
    sv.deactivate_by_email("e@x.com", None, "").await.unwrap();
    let sub = sv.by_email("e@x.com").await.unwrap().unwrap();
    assert!(!sub.is_active());
    assert_eq!(sub.plan_set(), PlanSet::from_raw("A"));

    let sub = sv.upsert_from_activation(activation("e@x.com", "B"), "").await.unwrap();
    assert!(sub.is_active());
    assert_eq!(sub.plan_set(), PlanSet::from_raw("A, B"));
    assert_eq!(sub.origin, Origin::Hotmart);
  }

  #[tokio::test]
  async fn test_deactivate_unknown_or_unheld_plan() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);

    assert!(sv.deactivate_by_email("nobody@x.com", None, "").await.unwrap().is_none());
    assert!(sv.deactivate_by_email("  ", None, "").await.unwrap().is_none());

    sv.upsert_from_activation(activation("e@x.com", "A"), "").await.unwrap();
    let change = sv.deactivate_by_email("e@x.com", Some("Z"), "").await.unwrap().unwrap();
    assert_eq!(change.after.plan_set(), PlanSet::from_raw("A"));
    assert!(change.after.is_active());
    assert_eq!(change.revocation(), None);
  }

  #[tokio::test]
  async fn test_find_by_email_and_phone() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);
    sv.upsert_from_activation(activation("e@x.com", "A"), "").await.unwrap();

    assert!(sv.find_by_email_and_phone(" E@X.com", "11912345678").await.unwrap().is_some());
    assert!(sv.find_by_email_and_phone("e@x.com", "11900000000").await.unwrap().is_none());
    assert!(sv.find_by_email_and_phone("other@x.com", "11912345678").await.unwrap().is_none());

    sv.deactivate_by_email("e@x.com", None, "").await.unwrap();
    assert!(sv.find_by_email_and_phone("e@x.com", "11912345678").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_update_transitions() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);
    let auth = Authorizations::new(&db);

    let sub = sv.create(activation("e@x.com", "A, B")).await.unwrap();
    assert_eq!(sub.origin, Origin::Manual);
    auth.authorize(7, sub.id, "").await.unwrap();

    let change = sv
      .update(sub.id, SubscriberUpdate {
        plans: Some(PlanSet::from_raw("B")),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(change.telegram_ids, vec![7]);
    assert_eq!(change.revocation(), Some(RevokeScope::Plans(PlanSet::from_raw("A"))));

    let change = sv
      .update(sub.id, SubscriberUpdate {
        status: Some(SubscriberStatus::Inactive),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(change.revocation(), Some(RevokeScope::Full));

    auth.set_authorized(7, false).await.unwrap();
    let change = sv
      .update(sub.id, SubscriberUpdate {
        status: Some(SubscriberStatus::Active),
        ..Default::default()
      })
      .await
      .unwrap();
    assert_eq!(change.revocation(), None);
    assert!(auth.by_telegram_id(7).await.unwrap().unwrap().authorized);

    let missing = sv.update(9999, SubscriberUpdate::default()).await;
    assert!(matches!(missing, Err(Error::SubscriberNotFound)));
  }

  #[tokio::test]
  async fn test_create_rejects_duplicates() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);
    sv.create(activation("e@x.com", "A")).await.unwrap();
    assert!(matches!(sv.create(activation(" E@x.com", "B")).await, Err(Error::InvalidArgs(_))));
    assert!(matches!(sv.create(activation("", "B")).await, Err(Error::InvalidArgs(_))));
  }

  #[tokio::test]
  async fn test_delete_and_stats() {
    let db = test_db::setup().await;
    let sv = Subscribers::new(&db);
    let auth = Authorizations::new(&db);

    let a = sv.create(activation("a@x.com", "VIP, Lite")).await.unwrap();
    let b = sv.create(activation("b@x.com", "VIP")).await.unwrap();
    auth.authorize(1, a.id, "").await.unwrap();
    auth.authorize(2, b.id, "").await.unwrap();

    let stats = sv.stats().await.unwrap();
    assert_eq!(stats.authorized_users, 2);
    assert_eq!(stats.active_subscribers, 2);
    assert_eq!(stats.by_plan.get("VIP"), Some(&2));
    assert_eq!(stats.by_plan.get("Lite"), Some(&1));

    let deleted = sv.delete(a.id, "removed by admin").await.unwrap();
    assert_eq!(deleted.map(|s| s.id), Some(a.id));
    assert!(sv.by_id(a.id).await.unwrap().is_none());
    assert!(auth.by_telegram_id(1).await.unwrap().is_none());
    assert!(sv.delete(a.id, "").await.unwrap().is_none());

    let logs = auth.logs_for_subscriber(a.id).await.unwrap();
    assert_eq!(logs.last().unwrap().action, LogAction::Revoked);
    assert_eq!(logs.last().unwrap().telegram_id, Some(1));
  }
}
