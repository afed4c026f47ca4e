//! Self-service identity verification: a bot-issued token plus the email and
//! phone of an active subscriber bind a Telegram identity to that subscriber.

use serde::{Deserialize, Serialize};
use teloxide::utils::html::escape;

use super::{Access, Authorizations, Subscribers};
use crate::{
  config::Config,
  phone,
  prelude::*,
  tokens::{Attempts, IdentityLocks, TokenStore},
};

/// Accepted phone length after stripping everything but digits.
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 10..=13;

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
  #[serde(default)]
  pub token: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub phone: String,
}

impl VerifyRequest {
  fn validate(&self) -> Result<()> {
    if self.token.trim().is_empty() {
      return Err(Error::InvalidArgs("Token is required.".into()));
    }

    let email = self.email.trim();
    if email.len() < 3 || !email.contains('@') || email.contains(char::is_whitespace) {
      return Err(Error::InvalidArgs("Invalid email.".into()));
    }

    if !PHONE_DIGITS.contains(&phone::normalize(&self.phone).len()) {
      return Err(Error::InvalidArgs("Invalid phone number.".into()));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verified {
  pub telegram_id: i64,
  pub subscriber_id: i32,
  pub name: String,
  pub plans: PlanSet,
  pub channels: Vec<String>,
  pub failed: Vec<String>,
}

pub struct Verification<'a> {
  db: &'a DatabaseConnection,
  messenger: &'a dyn Messenger,
  config: &'a Config,
  tokens: &'a TokenStore,
  attempts: &'a Attempts,
  locks: &'a IdentityLocks,
}

impl<'a> Verification<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    messenger: &'a dyn Messenger,
    config: &'a Config,
    tokens: &'a TokenStore,
    attempts: &'a Attempts,
    locks: &'a IdentityLocks,
  ) -> Self {
    Self { db, messenger, config, tokens, attempts, locks }
  }

  /// Issues a token for `telegram_id` and returns the frontend link, or
  /// `None` when no frontend is configured.
  pub fn link(&self, telegram_id: i64) -> Option<String> {
    let base = self.config.web_app_url.as_deref()?;
    let token = self.tokens.issue(telegram_id);
    debug!("issued verification token for {telegram_id}");
    Some(format!("{base}/verify?token={token}"))
  }

  /// Time left on a token, `None` if unknown or expired.
  pub fn check(&self, token: &str) -> Option<Duration> {
    self.tokens.validate(token).map(|p| p.expires_in(std::time::Instant::now()))
  }

  /// The token is only consumed once the data matches; of concurrent
  /// requests carrying one token at most one succeeds.
  pub async fn verify(&self, req: VerifyRequest) -> Result<Verified> {
    req.validate()?;
    let token = req.token.trim();

    let pending = self.tokens.validate(token).ok_or(Error::TokenInvalid)?;
    let telegram_id = pending.telegram_id;

    if self.attempts.is_blocked(telegram_id) {
      warn!("verification blocked for {telegram_id}: too many attempts");
      return Err(Error::TooManyAttempts);
    }

    let Some(subscriber) =
      Subscribers::new(self.db).find_by_email_and_phone(&req.email, &req.phone).await?
    else {
      let failures = self.attempts.record_failure(telegram_id);
      info!("verification mismatch for {telegram_id} ({failures} failure(s))");
      return Err(Error::VerificationMismatch);
    };

    self.tokens.consume(token).ok_or(Error::TokenInvalid)?;
    Authorizations::new(self.db)
      .authorize(telegram_id, subscriber.id, "verified via web app")
      .await?;
    self.attempts.clear(telegram_id);

    info!("{telegram_id} verified as {} (#{})", subscriber.email, subscriber.id);

    let access = Access::new(self.db, self.messenger, self.config, self.locks);
    let (subscriber, report) = access.refresh_invites(telegram_id).await?;

    let text = format!(
      "🎉 <b>Verified!</b> Welcome, {}.\n\n{}",
      escape(&subscriber.name),
      access.links_message(&subscriber, &report)
    );
    if let Err(err) = self.messenger.notify(telegram_id, &text).await {
      warn!("could not send links to {telegram_id}: {err}");
    }

    Ok(Verified {
      telegram_id,
      subscriber_id: subscriber.id,
      name: subscriber.name.clone(),
      plans: subscriber.plan_set(),
      channels: report.succeeded,
      failed: report.failed,
    })
  }
}
