use teloxide::Bot;

use crate::{
  config::Config,
  jobs::Jobs,
  prelude::*,
  sv::{Access, Authorizations, Channels, Subscribers, Verification},
  tokens::{Attempts, IdentityLocks, TokenStore},
};

pub struct AppState {
  pub db: DatabaseConnection,
  pub bot: Bot,
  pub config: Config,
  pub tokens: TokenStore,
  pub attempts: Attempts,
  pub locks: IdentityLocks,
  pub jobs: Jobs,
}

pub struct Services<'a> {
  pub subscriber: Subscribers<'a>,
  pub auth: Authorizations<'a>,
  pub channel: Channels<'a>,
  pub access: Access<'a>,
}

impl<'a> Services<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    messenger: &'a dyn Messenger,
    config: &'a Config,
    locks: &'a IdentityLocks,
  ) -> Self {
    Self {
      subscriber: Subscribers::new(db),
      auth: Authorizations::new(db),
      channel: Channels::new(db),
      access: Access::new(db, messenger, config, locks),
    }
  }
}

impl AppState {
  pub fn new(db: DatabaseConnection, bot: Bot, config: Config) -> Self {
    Self {
      tokens: TokenStore::new(config.token_ttl),
      attempts: Attempts::new(config.max_attempts),
      locks: IdentityLocks::new(),
      jobs: Jobs::new(),
      db,
      bot,
      config,
    }
  }

  pub fn sv(&self) -> Services<'_> {
    Services::new(&self.db, &self.bot, &self.config, &self.locks)
  }

  pub fn verification(&self) -> Verification<'_> {
    Verification::new(
      &self.db,
      &self.bot,
      &self.config,
      &self.tokens,
      &self.attempts,
      &self.locks,
    )
  }

  pub fn is_admin(&self, telegram_id: i64) -> bool {
    self.config.is_admin(telegram_id)
  }
}
