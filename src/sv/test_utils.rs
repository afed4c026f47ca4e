//! Shared test utilities: in-memory database and a recording messenger.

#[cfg(test)]
pub mod test_db {
  use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};

  use crate::entity::*;

  /// Creates an in-memory SQLite database with all required tables
  pub async fn setup() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();

    // parents before children so foreign keys resolve
    let stmt = schema.create_table_from_entity(subscriber::Entity);
    db.execute(backend.build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(channel::Entity);
    db.execute(backend.build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(authorized_user::Entity);
    db.execute(backend.build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(invite_link::Entity);
    db.execute(backend.build(&stmt)).await.unwrap();

    let stmt = schema.create_table_from_entity(authorization_log::Entity);
    db.execute(backend.build(&stmt)).await.unwrap();

    db
  }
}

#[cfg(test)]
pub mod fake {
  use std::{
    collections::HashSet,
    sync::{
      Mutex,
      atomic::{AtomicU32, Ordering},
    },
    time::Instant,
  };

  use async_trait::async_trait;

  use crate::{
    config::{Config, Pacing},
    messenger::{InviteOptions, Messenger, MessengerError},
  };

  #[derive(Debug, Clone, PartialEq, Eq)]
  pub enum Call {
    CreateInvite { chat: String, member_limit: Option<u32> },
    RevokeInvite { chat: String, link: String },
    Ban { chat: String, user: i64 },
    Unban { chat: String, user: i64 },
    Notify { user: i64, text: String },
  }

  /// Records every call with the moment it was made; chats listed in
  /// `failing` reject everything.
  #[derive(Default)]
  pub struct FakeMessenger {
    calls: Mutex<Vec<(Instant, Call)>>,
    failing: Mutex<HashSet<String>>,
    counter: AtomicU32,
  }

  impl FakeMessenger {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn fail_chat(&self, chat: &str) {
      self.failing.lock().unwrap().insert(chat.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
      self.timed_calls().into_iter().map(|(_, call)| call).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
      self.calls.lock().unwrap().clone()
    }

    pub fn bans(&self) -> Vec<(String, i64)> {
      self
        .calls()
        .into_iter()
        .filter_map(|c| match c {
          Call::Ban { chat, user } => Some((chat, user)),
          _ => None,
        })
        .collect()
    }

    pub fn revoked_links(&self) -> Vec<String> {
      self
        .calls()
        .into_iter()
        .filter_map(|c| match c {
          Call::RevokeInvite { link, .. } => Some(link),
          _ => None,
        })
        .collect()
    }

    pub fn notifications(&self) -> Vec<(i64, String)> {
      self
        .calls()
        .into_iter()
        .filter_map(|c| match c {
          Call::Notify { user, text } => Some((user, text)),
          _ => None,
        })
        .collect()
    }

    fn record(&self, call: Call) {
      self.calls.lock().unwrap().push((Instant::now(), call));
    }

    fn check(&self, chat: &str) -> Result<(), MessengerError> {
      if self.failing.lock().unwrap().contains(chat) {
        Err(MessengerError::Forbidden(format!("bot is not an admin of {chat}")))
      } else {
        Ok(())
      }
    }
  }

  #[async_trait]
  impl Messenger for FakeMessenger {
    async fn create_invite(
      &self,
      chat: &str,
      options: InviteOptions,
    ) -> Result<String, MessengerError> {
      let member_limit =
        (!options.creates_join_request).then_some(options.member_limit);
      self.record(Call::CreateInvite { chat: chat.to_string(), member_limit });
      self.check(chat)?;
      let n = self.counter.fetch_add(1, Ordering::SeqCst);
      Ok(format!("https://t.me/+invite{n}"))
    }

    async fn revoke_invite(
      &self,
      chat: &str,
      link: &str,
    ) -> Result<(), MessengerError> {
      self.record(Call::RevokeInvite {
        chat: chat.to_string(),
        link: link.to_string(),
      });
      self.check(chat)
    }

    async fn ban_member(
      &self,
      chat: &str,
      user: i64,
    ) -> Result<(), MessengerError> {
      self.record(Call::Ban { chat: chat.to_string(), user });
      self.check(chat)
    }

    async fn unban_member(
      &self,
      chat: &str,
      user: i64,
    ) -> Result<(), MessengerError> {
      self.record(Call::Unban { chat: chat.to_string(), user });
      self.check(chat)
    }

    async fn notify(&self, user: i64, text: &str) -> Result<(), MessengerError> {
      self.record(Call::Notify { user, text: text.to_string() });
      Ok(())
    }
  }

  pub fn config() -> Config {
    Config { pacing: Pacing::none(), ..Config::default() }
  }
}
