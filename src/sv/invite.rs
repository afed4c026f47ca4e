//! Per-user, per-channel invite links.
//!
//! A link is created with a member limit of one and a fixed lifetime, then
//! either used, left to expire on the platform, or revoked here. Revoked rows
//! are terminal: they are never shown again nor revoked twice.

use sea_orm::sea_query::Expr;
use serde::Serialize;
use teloxide::utils::html::escape;

use crate::{
  config::Config,
  entity::{channel, invite_link},
  messenger::{InviteOptions, with_retry},
  prelude::*,
};

/// Outcome of a fan-out over channels; partial success is normal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueReport {
  /// One HTML block per channel, ready to send.
  pub text: String,
  pub succeeded: Vec<String>,
  pub failed: Vec<String>,
}

pub struct Invites<'a> {
  db: &'a DatabaseConnection,
  messenger: &'a dyn Messenger,
  config: &'a Config,
}

impl<'a> Invites<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    messenger: &'a dyn Messenger,
    config: &'a Config,
  ) -> Self {
    Self { db, messenger, config }
  }

  /// Creates one link per channel. A failing channel gets a placeholder
  /// line and the batch continues.
  pub async fn issue_for(
    &self,
    telegram_id: i64,
    channels: &[channel::Model],
  ) -> Result<IssueReport> {
    let mut report = IssueReport::default();
    let ttl = TimeDelta::from_std(self.config.invite_ttl)
      .map_err(|e| Error::Internal(format!("invite ttl out of range: {e}")))?;

    for (i, channel) in channels.iter().enumerate() {
      let Some(chat) = channel.destination() else {
        warn!("channel `{}` has no chat id configured", channel.name);
        report.text.push_str(&format!(
          "• <b>{}</b>\n  ⚠️ Link unavailable, channel not configured yet\n\n",
          escape(&channel.name)
        ));
        report.failed.push(channel.name.clone());
        continue;
      };

      if i > 0 && !self.config.pacing.invite.is_zero() {
        tokio::time::sleep(self.config.pacing.invite).await;
      }

      let created_at = Utc::now();
      let expire_at = created_at + ttl;
      let options = InviteOptions {
        member_limit: 1,
        expire_at,
        creates_join_request: channel.creates_join_request,
      };

      match with_retry(|| self.messenger.create_invite(chat, options)).await {
        Ok(link) => {
          invite_link::ActiveModel {
            telegram_id: Set(telegram_id),
            channel_id: Set(channel.id),
            link: Set(link.clone()),
            expire_at: Set(expire_at.naive_utc()),
            created_at: Set(created_at.naive_utc()),
            revoked_at: Set(None),
            ..Default::default()
          }
          .insert(self.db)
          .await?;

          report.text.push_str(&format!(
            "• <b>{}</b>\n  {}\n\n",
            escape(&channel.name),
            escape(&link)
          ));
          report.succeeded.push(channel.name.clone());
        }
        Err(err) => {
          warn!(
            "failed to create invite for {telegram_id} in `{}` ({chat}): {err}",
            channel.name
          );
          report.text.push_str(&format!(
            "• <b>{}</b>\n  ⚠️ Could not generate a link, contact {}\n\n",
            escape(&channel.name),
            escape(&self.config.support_username)
          ));
          report.failed.push(channel.name.clone());
        }
      }
    }

    debug!(
      "issued {} invite(s) for {telegram_id}, {} failed",
      report.succeeded.len(),
      report.failed.len()
    );
    Ok(report)
  }

  /// Links not yet revoked, with their channel.
  pub async fn active_for(
    &self,
    telegram_id: i64,
  ) -> Result<Vec<(invite_link::Model, Option<channel::Model>)>> {
    let links = invite_link::Entity::find()
      .filter(invite_link::Column::TelegramId.eq(telegram_id))
      .filter(invite_link::Column::RevokedAt.is_null())
      .find_also_related(channel::Entity)
      .order_by_asc(invite_link::Column::Id)
      .all(self.db)
      .await?;
    Ok(links)
  }

  /// Revokes every outstanding link of the identity.
  pub async fn revoke_active_for(&self, telegram_id: i64) -> Result<usize> {
    let links = self.active_for(telegram_id).await?;
    self.revoke_links(links).await
  }

  /// Revokes only links into channels tied to `plans`; wildcard channels and
  /// channels of retained plans keep their links.
  pub async fn revoke_for_plans(
    &self,
    telegram_id: i64,
    plans: &PlanSet,
  ) -> Result<usize> {
    let links = self
      .active_for(telegram_id)
      .await?
      .into_iter()
      .filter(|(_, channel)| {
        channel.as_ref().is_some_and(|c| !c.is_wildcard() && plans.contains_ci(&c.plan))
      })
      .collect();
    self.revoke_links(links).await
  }

  /// Platform failures are tolerated; every attempted link is marked revoked
  /// in one update.
  async fn revoke_links(
    &self,
    links: Vec<(invite_link::Model, Option<channel::Model>)>,
  ) -> Result<usize> {
    let mut ids = Vec::with_capacity(links.len());

    for (i, (link, channel)) in links.iter().enumerate() {
      ids.push(link.id);
      let Some(chat) = channel.as_ref().and_then(|c| c.destination()) else {
        continue;
      };

      if i > 0 && !self.config.pacing.revoke.is_zero() {
        tokio::time::sleep(self.config.pacing.revoke).await;
      }

      if let Err(err) =
        with_retry(|| self.messenger.revoke_invite(chat, &link.link)).await
      {
        warn!("failed to revoke invite {} in {chat}: {err}", link.link);
      }
    }

    if !ids.is_empty() {
      invite_link::Entity::update_many()
        .col_expr(invite_link::Column::RevokedAt, Expr::value(now()))
        .filter(invite_link::Column::Id.is_in(ids.clone()))
        .exec(self.db)
        .await?;
    }

    Ok(ids.len())
  }
}

#[cfg(test)]
mod tests {
  use std::time::Instant;

  use super::*;
  use crate::{
    config::Pacing,
    sv::{
      channel::tests::channel,
      test_utils::{
        fake::{self, Call, FakeMessenger},
        test_db,
      },
    },
  };

  #[tokio::test]
  async fn test_partial_failure_continues() {
    let db = test_db::setup().await;
    let messenger = FakeMessenger::new();
    let config = fake::config();
    let invites = Invites::new(&db, &messenger, &config);

    let channels = vec![
      channel(&db, "One", Some("-1001"), "VIP", 1).await,
      channel(&db, "Broken", Some("-1002"), "VIP", 2).await,
      channel(&db, "Unset", None, "VIP", 3).await,
      channel(&db, "Three", Some("-1003"), "VIP", 4).await,
    ];
    messenger.fail_chat("-1002");

    let report = invites.issue_for(42, &channels).await.unwrap();
    assert_eq!(report.succeeded, vec!["One", "Three"]);
    assert_eq!(report.failed, vec!["Broken", "Unset"]);
    assert!(report.text.contains("https://t.me/+invite0"));
    assert!(report.text.contains("Could not generate a link, contact @support"));
    assert!(report.text.contains("channel not configured"));

    let active = invites.active_for(42).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|(l, _)| l.revoked_at.is_none()));
  }

  #[tokio::test]
  async fn test_member_limit_and_join_requests() {
    let db = test_db::setup().await;
    let messenger = FakeMessenger::new();
    let config = fake::config();
    let invites = Invites::new(&db, &messenger, &config);

    let plain = channel(&db, "Plain", Some("-1001"), "VIP", 1).await;
    let approval = crate::sv::Channels::new(&db)
      .create(crate::sv::channel::NewChannel {
        name: "Approval".into(),
        chat_id: Some("-1002".into()),
        plan: "VIP".into(),
        creates_join_request: true,
        ..Default::default()
      })
      .await
      .unwrap();

    invites.issue_for(42, &[plain, approval]).await.unwrap();
    assert_eq!(messenger.calls(), vec![
      Call::CreateInvite { chat: "-1001".into(), member_limit: Some(1) },
      Call::CreateInvite { chat: "-1002".into(), member_limit: None },
    ]);
  }

  #[tokio::test]
  async fn test_revoke_then_reissue_never_overlaps() {
    let db = test_db::setup().await;
    let messenger = FakeMessenger::new();
    let config = fake::config();
    let invites = Invites::new(&db, &messenger, &config);
    let channels = vec![channel(&db, "VIP", Some("-1001"), "VIP", 1).await];

    let first = invites.issue_for(42, &channels).await.unwrap();
    assert_eq!(first.succeeded.len(), 1);

    assert_eq!(invites.revoke_active_for(42).await.unwrap(), 1);
    assert_eq!(messenger.revoked_links(), vec!["https://t.me/+invite0"]);
    assert!(invites.active_for(42).await.unwrap().is_empty());

    invites.issue_for(42, &channels).await.unwrap();
    let active = invites.active_for(42).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].0.link, "https://t.me/+invite1");

    // revoked rows are not revoked twice
    invites.revoke_active_for(42).await.unwrap();
    assert_eq!(messenger.revoked_links().len(), 2);
    assert_eq!(invites.revoke_active_for(42).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_revoke_failures_still_marked() {
    let db = test_db::setup().await;
    let messenger = FakeMessenger::new();
    let config = fake::config();
    let invites = Invites::new(&db, &messenger, &config);
    let channels = vec![
      channel(&db, "A", Some("-1001"), "VIP", 1).await,
      channel(&db, "B", Some("-1002"), "VIP", 2).await,
    ];

    invites.issue_for(42, &channels).await.unwrap();
    messenger.fail_chat("-1001");

    assert_eq!(invites.revoke_active_for(42).await.unwrap(), 2);
    assert_eq!(messenger.revoked_links().len(), 2);
    assert!(invites.active_for(42).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_plan_scoped_revocation() {
    let db = test_db::setup().await;
    let messenger = FakeMessenger::new();
    let config = fake::config();
    let invites = Invites::new(&db, &messenger, &config);
    let channels = vec![
      channel(&db, "Everyone", Some("-1000"), "all", 0).await,
      channel(&db, "A", Some("-1001"), "Plan A", 1).await,
      channel(&db, "B", Some("-1002"), "Plan B", 2).await,
    ];

    invites.issue_for(42, &channels).await.unwrap();
    let revoked = invites.revoke_for_plans(42, &PlanSet::from_raw("plan a")).await.unwrap();
    assert_eq!(revoked, 1);

    let remaining: Vec<_> = invites
      .active_for(42)
      .await
      .unwrap()
      .into_iter()
      .filter_map(|(_, c)| c.map(|c| c.name))
      .collect();
    assert_eq!(remaining, vec!["Everyone", "B"]);
  }

  #[tokio::test]
  async fn test_issue_is_paced() {
    let db = test_db::setup().await;
    let messenger = FakeMessenger::new();
    let delay = Duration::from_millis(150);
    let config = Config {
      pacing: Pacing { invite: delay, ..Pacing::none() },
      ..fake::config()
    };
    let invites = Invites::new(&db, &messenger, &config);
    let channels = vec![
      channel(&db, "A", Some("-1001"), "VIP", 1).await,
      channel(&db, "B", Some("-1002"), "VIP", 2).await,
      channel(&db, "C", Some("-1003"), "VIP", 3).await,
    ];

    let start = Instant::now();
    invites.issue_for(42, &channels).await.unwrap();

    let stamps: Vec<_> = messenger.timed_calls().into_iter().map(|(at, _)| at).collect();
    assert_eq!(stamps.len(), 3);
    assert!(stamps[0] - start < delay);
    assert!(stamps.windows(2).all(|pair| pair[1] - pair[0] >= delay));
    assert!(start.elapsed() >= delay * 2);
  }
}
