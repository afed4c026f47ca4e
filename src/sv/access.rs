//! Reconciliation flows: payment webhooks, admin edits and bulk imports,
//! each followed by the access changes it implies.

use json::Value;
use serde::{Deserialize, Serialize};
use teloxide::utils::html::escape;
use uuid::Uuid;

use super::{
  Authorizations, Channels, Invites, RevokeScope, Revoker, Subscribers,
  invite::IssueReport,
  revoker::RevokeReport,
  subscriber::{Change, NewSubscriber, SubscriberUpdate, normalize_email},
};
use crate::{
  config::Config,
  entity::{Origin, SubscriberStatus, subscriber},
  hotmart::{self, Action, SubscriberData},
  jobs::Jobs,
  prelude::*,
  tokens::IdentityLocks,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
  Ignored { event: String, status: String },
  MissingEmail,
  NoPlan,
  Activated { subscriber_id: i32, plan: String },
  /// `subscriber_id` is `None` for emails never seen before.
  Deactivated { subscriber_id: Option<i32>, plan: String },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
  pub revoked: Vec<i64>,
  pub failed_channels: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Removal {
  pub subscriber: subscriber::Model,
  pub revocations: Vec<RevokeReport>,
  pub notified: usize,
}

/// One row of a bulk import.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportRow {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub phone: String,
  #[serde(default, alias = "plan")]
  pub plans: PlanSet,
  #[serde(default)]
  pub status: Option<SubscriberStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportDetail {
  pub email: String,
  pub status: &'static str,
  pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
  pub created: usize,
  pub updated: usize,
  pub skipped: usize,
  pub errors: usize,
  pub details: Vec<ImportDetail>,
  /// Subscribers absent from the import, removed afterwards.
  #[serde(skip)]
  pub to_remove: Vec<i32>,
}

pub struct Access<'a> {
  db: &'a DatabaseConnection,
  messenger: &'a dyn Messenger,
  config: &'a Config,
  locks: &'a IdentityLocks,
}

impl<'a> Access<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    messenger: &'a dyn Messenger,
    config: &'a Config,
    locks: &'a IdentityLocks,
  ) -> Self {
    Self { db, messenger, config, locks }
  }

  /// Revocation under the identity's lock, so it never interleaves with a
  /// refresh of the same identity.
  async fn revoke(
    &self,
    telegram_id: i64,
    scope: RevokeScope,
    context: &str,
  ) -> Result<RevokeReport> {
    let _guard = self.locks.lock(telegram_id).await;
    Revoker::new(self.db, self.messenger, self.config)
      .revoke(telegram_id, scope, context)
      .await
  }

  fn revoked_notice(&self) -> String {
    format!(
      "⚠️ Your access to the exclusive channels has been revoked.\n\n\
      If this is a mistake, contact support: {}",
      self.config.support_username
    )
  }

  /// Classifies an authenticated webhook payload and applies it.
  pub async fn apply_webhook(&self, payload: &Value) -> Result<WebhookOutcome> {
    let event = hotmart::event_type(payload);
    let status = hotmart::status(payload);
    let decision = hotmart::decide(&event, &status);

    info!(
      "hotmart webhook: event `{}`, status `{}`",
      or_na(&event),
      or_na(&status)
    );

    if decision.action == Action::Ignore {
      return Ok(WebhookOutcome::Ignored { event, status });
    }

    let data = SubscriberData::extract(payload);
    if data.email.is_empty() {
      return Ok(WebhookOutcome::MissingEmail);
    }

    let Some(plan) = self.config.plan_map.resolve(&data) else {
      return Ok(WebhookOutcome::NoPlan);
    };

    let context = format!(
      "event={}, status={}, source={}",
      or_na(&event),
      or_na(&status),
      decision.source.as_str()
    );

    match decision.action {
      Action::Activate => {
        let subscriber = self.activate(&data, &plan.name, &context).await?;
        Ok(WebhookOutcome::Activated { subscriber_id: subscriber.id, plan: plan.name })
      }
      _ => {
        // a defaulted plan says nothing about which product was cancelled
        let scoped = plan.from_payload().then_some(plan.name.as_str());
        let change = self.deactivate(&data.email, scoped, &context).await?;
        Ok(WebhookOutcome::Deactivated {
          subscriber_id: change.map(|c| c.after.id),
          plan: plan.name,
        })
      }
    }
  }

  pub async fn activate(
    &self,
    data: &SubscriberData,
    plan: &str,
    context: &str,
  ) -> Result<subscriber::Model> {
    let subscriber = Subscribers::new(self.db)
      .upsert_from_activation(
        NewSubscriber {
          name: data.display_name().to_string(),
          email: data.email.clone(),
          phone: data.phone.clone(),
          plans: PlanSet::from_raw(plan),
          ..Default::default()
        },
        context,
      )
      .await?;

    info!(
      "activated {} (#{}) for `{plan}`, plans now: {}",
      subscriber.email, subscriber.id, subscriber.plans
    );
    Ok(subscriber)
  }

  /// Applies a cancellation and withdraws the access it removes from every
  /// identity bound to the subscriber.
  pub async fn deactivate(
    &self,
    email: &str,
    plan: Option<&str>,
    context: &str,
  ) -> Result<Option<Change>> {
    let Some(change) =
      Subscribers::new(self.db).deactivate_by_email(email, plan, context).await?
    else {
      info!("deactivation for unknown email {}, nothing to do", normalize_email(email));
      return Ok(None);
    };

    // replays against an inactive subscriber converge on full revocation
    let scope = change
      .revocation()
      .or_else(|| (!change.after.is_active()).then_some(RevokeScope::Full));

    if let Some(scope) = scope {
      for &telegram_id in &change.telegram_ids {
        self.revoke(telegram_id, scope.clone(), context).await?;
      }
    }

    info!(
      "deactivated {} (#{}): status {:?}, plans `{}`",
      change.after.email, change.after.id, change.after.status, change.after.plans
    );
    Ok(Some(change))
  }

  /// Admin edit followed by whatever revocation the edit implies.
  pub async fn update_subscriber(
    &self,
    id: i32,
    update: SubscriberUpdate,
  ) -> Result<Change> {
    let change = Subscribers::new(self.db).update(id, update).await?;

    if let Some(scope) = change.revocation() {
      for &telegram_id in &change.telegram_ids {
        self.revoke(telegram_id, scope.clone(), "updated by admin").await?;
      }
    }
    Ok(change)
  }

  /// Revokes everything, optionally tells the user, then deletes the
  /// subscriber.
  pub async fn remove_subscriber(&self, id: i32, notify: bool) -> Result<Option<Removal>> {
    let Some(subscriber) = Subscribers::new(self.db).by_id(id).await? else {
      return Ok(None);
    };

    let bindings = Authorizations::new(self.db).by_subscriber(id).await?;
    let mut revocations = Vec::with_capacity(bindings.len());
    let mut notified = 0;

    for binding in &bindings {
      let revoked = self
        .revoke(binding.telegram_id, RevokeScope::Full, "removed by admin")
        .await?;
      revocations.push(revoked);

      if notify {
        match self.messenger.notify(binding.telegram_id, &self.revoked_notice()).await {
          Ok(()) => notified += 1,
          Err(err) => debug!("could not notify {}: {err}", binding.telegram_id),
        }
      }
    }

    Subscribers::new(self.db).delete(id, "removed by admin").await?;
    info!("removed subscriber {} (#{id})", subscriber.email);

    Ok(Some(Removal { subscriber, revocations, notified }))
  }

  pub async fn remove_by_email(&self, email: &str, notify: bool) -> Result<Removal> {
    let subscriber = Subscribers::new(self.db)
      .by_email(email)
      .await?
      .ok_or(Error::SubscriberNotFound)?;
    self.remove_subscriber(subscriber.id, notify).await?.ok_or(Error::SubscriberNotFound)
  }

  /// Revokes every still-authorized identity bound to an inactive subscriber.
  pub async fn sync_inactive(&self) -> Result<SyncReport> {
    let stale = Authorizations::new(self.db).stale().await?;
    let mut report = SyncReport::default();

    let notice = format!(
      "⚠️ <b>Access revoked</b>\n\n\
      We could not find an active subscription linked to your account, so \
      your channel access was removed.\n\n\
      Contact {} if you need help.",
      self.config.support_username
    );

    for (user, subscriber) in stale {
      let revoked = self
        .revoke(user.telegram_id, RevokeScope::Full, "sync: subscription inactive")
        .await?;
      report.failed_channels += revoked.failed.len();
      report.revoked.push(user.telegram_id);

      if let Err(err) = self.messenger.notify(user.telegram_id, &notice).await {
        debug!("could not notify {} ({}): {err}", user.telegram_id, subscriber.email);
      }
    }

    info!("sync revoked {} identity(ies)", report.revoked.len());
    Ok(report)
  }

  /// Revokes the identity's outstanding links and issues fresh ones for the
  /// plans it currently holds. Concurrent refreshes of one identity run one
  /// after the other.
  pub async fn refresh_invites(
    &self,
    telegram_id: i64,
  ) -> Result<(subscriber::Model, IssueReport)> {
    let _guard = self.locks.lock(telegram_id).await;

    let (user, subscriber) = Authorizations::new(self.db)
      .with_subscriber(telegram_id)
      .await?
      .ok_or(Error::NotAuthorized)?;

    if !user.authorized {
      return Err(Error::NotAuthorized);
    }
    if !subscriber.is_active() {
      return Err(Error::SubscriberInactive(subscriber.email));
    }

    let channels = Channels::new(self.db).for_plans(&subscriber.plan_set()).await?;
    let invites = Invites::new(self.db, self.messenger, self.config);

    invites.revoke_active_for(telegram_id).await?;
    let report = invites.issue_for(telegram_id, &channels).await?;
    Ok((subscriber, report))
  }

  /// Creates or updates each row. Subscribers missing from the import are
  /// only listed in the summary; see [`Access::remove_batch`].
  pub async fn import(&self, rows: Vec<ImportRow>) -> Result<ImportSummary> {
    let subscribers = Subscribers::new(self.db);
    let mut summary = ImportSummary::default();

    let present: HashSet<String> = rows
      .iter()
      .map(|row| normalize_email(&row.email))
      .filter(|email| !email.is_empty())
      .collect();

    summary.to_remove = subscribers
      .all()
      .await?
      .into_iter()
      .filter(|s| !present.contains(&s.email))
      .map(|s| s.id)
      .collect();

    for row in rows {
      let email = normalize_email(&row.email);
      let incomplete = row.name.trim().is_empty()
        || email.is_empty()
        || row.phone.trim().is_empty()
        || row.plans.is_empty();
      if incomplete {
        summary.skipped += 1;
        summary.details.push(ImportDetail {
          email: if email.is_empty() { "(no email)".into() } else { email },
          status: "skipped",
          reason: "incomplete row".into(),
        });
        continue;
      }

      let result = match subscribers.by_email(&email).await? {
        Some(existing) => self
          .update_subscriber(existing.id, SubscriberUpdate {
            name: Some(row.name),
            email: None,
            phone: Some(row.phone),
            plans: Some(row.plans),
            status: Some(row.status.unwrap_or(SubscriberStatus::Active)),
          })
          .await
          .map(|_| "updated"),
        None => subscribers
          .create(NewSubscriber {
            name: row.name,
            email: email.clone(),
            phone: row.phone,
            plans: row.plans,
            origin: Origin::Import,
          })
          .await
          .map(|_| "created"),
      };

      match result {
        Ok(status) => {
          if status == "created" {
            summary.created += 1;
          } else {
            summary.updated += 1;
          }
          summary.details.push(ImportDetail { email, status, reason: String::new() });
        }
        Err(err) => {
          warn!("import of {email} failed: {err}");
          summary.errors += 1;
          summary.details.push(ImportDetail {
            email,
            status: "error",
            reason: err.to_string(),
          });
        }
      }
    }

    info!(
      "import: {} created, {} updated, {} skipped, {} errors, {} to remove",
      summary.created,
      summary.updated,
      summary.skipped,
      summary.errors,
      summary.to_remove.len()
    );
    Ok(summary)
  }

  /// Removes `ids` in paced batches under job `job`.
  pub async fn remove_batch(&self, jobs: &Jobs, job: Uuid, ids: Vec<i32>) {
    let pacing = self.config.pacing;
    jobs
      .run_batched(job, ids, pacing.batch_size, pacing.batch, |id| async move {
        self
          .remove_subscriber(id, false)
          .await
          .map(|_| ())
          .map_err(|err| format!("subscriber #{id}: {err}"))
      })
      .await;
  }

  /// Header plus per-channel lines for a set of fresh links, as HTML.
  pub fn links_message(
    &self,
    subscriber: &subscriber::Model,
    report: &IssueReport,
  ) -> String {
    if report.text.is_empty() {
      return format!(
        "⚠️ No channels are available for your plan yet.\n\nContact support: {}",
        self.config.support_username
      );
    }

    format!(
      "✅ <b>Your channels</b> (plan: {})\n\n{}💡 Single-use links, valid for {}.",
      escape(&subscriber.plan_set().to_string()),
      report.text,
      humantime::format_duration(self.config.invite_ttl)
    )
  }
}

fn or_na(value: &str) -> &str {
  if value.is_empty() { "n/a" } else { value }
}
