//! Withdrawal of channel access for one Telegram identity.
//!
//! Outstanding invites are revoked first, then the member is banned and
//! immediately unbanned in every affected channel, which ejects them without
//! leaving them on the channel's block list. Each channel is attempted even
//! when earlier ones fail.

use sea_orm::sea_query::Expr;
use serde::Serialize;

use super::{Authorizations, Channels, Invites, authorization::log};
use crate::{
  config::Config,
  entity::{LogAction, authorized_user},
  messenger::with_retry,
  prelude::*,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeScope {
  /// Every plan channel of the subscriber, every channel the identity was
  /// invited to and the wildcard channels. Marks the binding unauthorized.
  Full,
  /// Only channels tied to these plans; wildcard channels are kept.
  Plans(PlanSet),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RevokeReport {
  pub invites_revoked: usize,
  pub succeeded: Vec<String>,
  pub failed: Vec<String>,
}

pub struct Revoker<'a> {
  db: &'a DatabaseConnection,
  messenger: &'a dyn Messenger,
  config: &'a Config,
}

impl<'a> Revoker<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    messenger: &'a dyn Messenger,
    config: &'a Config,
  ) -> Self {
    Self { db, messenger, config }
  }

  pub async fn revoke(
    &self,
    telegram_id: i64,
    scope: RevokeScope,
    context: &str,
  ) -> Result<RevokeReport> {
    let binding = Authorizations::new(self.db).with_subscriber(telegram_id).await?;
    let subscriber_id = binding.as_ref().map(|(user, _)| user.subscriber_id);

    let channels = Channels::new(self.db);
    let invites = Invites::new(self.db, self.messenger, self.config);

    let (targets, invites_revoked) = match &scope {
      RevokeScope::Full => {
        let plans = binding.as_ref().map(|(_, sub)| sub.plan_set()).unwrap_or_default();
        let mut targets = channels.for_plans(&plans).await?;

        // the last plan may already be gone from the subscriber
        let invited: Vec<_> = channels
          .invited_to(telegram_id)
          .await?
          .into_iter()
          .filter(|c| !targets.iter().any(|t| t.id == c.id))
          .collect();
        targets.extend(invited);
        targets.sort_by_key(|c| (c.ordering, c.id));

        (targets, invites.revoke_active_for(telegram_id).await?)
      }
      RevokeScope::Plans(plans) => (
        channels.for_plans_exact(plans).await?,
        invites.revoke_for_plans(telegram_id, plans).await?,
      ),
    };

    let mut report = RevokeReport { invites_revoked, ..Default::default() };

    let mut first = true;
    for channel in &targets {
      let Some(chat) = channel.destination() else {
        continue;
      };

      if !first && !self.config.pacing.ban.is_zero() {
        tokio::time::sleep(self.config.pacing.ban).await;
      }
      first = false;

      let removal =
        match with_retry(|| self.messenger.ban_member(chat, telegram_id)).await {
          Ok(()) => {
            with_retry(|| self.messenger.unban_member(chat, telegram_id)).await
          }
          err => err,
        };

      match removal {
        Ok(()) => report.succeeded.push(channel.name.clone()),
        Err(err) => {
          warn!(
            "failed to remove {telegram_id} from `{}` ({chat}): {err}",
            channel.name
          );
          report.failed.push(channel.name.clone());
        }
      }
    }

    let txn = self.db.begin().await?;
    let context = match &scope {
      RevokeScope::Full => {
        authorized_user::Entity::update_many()
          .col_expr(authorized_user::Column::Authorized, Expr::value(false))
          .filter(authorized_user::Column::TelegramId.eq(telegram_id))
          .exec(&txn)
          .await?;
        context.to_string()
      }
      RevokeScope::Plans(plans) => format!("{context} (plans: {plans})"),
    };
    log(&txn, Some(telegram_id), subscriber_id, LogAction::Revoked, context.trim())
      .await?;
    txn.commit().await?;

    info!(
      "revoked {telegram_id}: {} invite(s), {} channel(s) ok, {} failed",
      report.invites_revoked,
      report.succeeded.len(),
      report.failed.len()
    );
    Ok(report)
  }
}
