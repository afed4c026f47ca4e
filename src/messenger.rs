//! Outbound port to the messaging platform.
//!
//! Services talk to [`Messenger`] so the reconciliation flows can run against
//! a recording fake in tests; production uses the teloxide [`Bot`].

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{
  ApiError, Bot, RequestError,
  prelude::*,
  types::{ParseMode, Recipient, UserId},
};
use thiserror::Error;

/// Longest retry-after wait honoured before giving up on a call.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum MessengerError {
  #[error("rate limited, retry after {0:?}")]
  RateLimited(Duration),
  #[error("forbidden: {0}")]
  Forbidden(String),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("{0}")]
  Other(String),
}

impl From<RequestError> for MessengerError {
  fn from(err: RequestError) -> Self {
    match err {
      RequestError::RetryAfter(secs) => Self::RateLimited(secs.duration()),
      RequestError::Api(api) => classify_api(&api),
      other => Self::Other(other.to_string()),
    }
  }
}

fn classify_api(api: &ApiError) -> MessengerError {
  let text = api.to_string();
  match api {
    ApiError::BotBlocked
    | ApiError::BotKicked
    | ApiError::BotKickedFromSupergroup
    | ApiError::BotKickedFromChannel
    | ApiError::UserDeactivated
    | ApiError::CantInitiateConversation
    | ApiError::NotEnoughRightsToRestrict
    | ApiError::NotEnoughRightsToChangeChatPermissions
    | ApiError::NotEnoughRightsToPostMessages
    | ApiError::CantRestrictSelf
    | ApiError::CantDemoteChatCreator => MessengerError::Forbidden(text),
    ApiError::ChatNotFound | ApiError::UserNotFound => {
      MessengerError::NotFound(text)
    }
    ApiError::Unknown(raw) => classify_unknown(raw, text),
    _ => MessengerError::Other(text),
  }
}

/// Platform descriptions teloxide has no variant for.
fn classify_unknown(raw: &str, text: String) -> MessengerError {
  let lower = raw.to_lowercase();
  if ["not enough rights", "chat_admin_required", "administrator"]
    .iter()
    .any(|k| lower.contains(k))
  {
    MessengerError::Forbidden(text)
  } else if ["participant_id_invalid", "user_id_invalid", "invite_hash_expired"]
    .iter()
    .any(|k| lower.contains(k))
  {
    MessengerError::NotFound(text)
  } else {
    MessengerError::Other(text)
  }
}

#[derive(Debug, Clone, Copy)]
pub struct InviteOptions {
  pub member_limit: u32,
  pub expire_at: DateTime<Utc>,
  /// Joins wait for admin approval. The platform rejects a member limit on
  /// such links, so the limit is dropped.
  pub creates_join_request: bool,
}

#[async_trait]
pub trait Messenger: Send + Sync {
  /// Returns the invite URL.
  async fn create_invite(
    &self,
    chat: &str,
    options: InviteOptions,
  ) -> Result<String, MessengerError>;

  async fn revoke_invite(
    &self,
    chat: &str,
    link: &str,
  ) -> Result<(), MessengerError>;

  async fn ban_member(&self, chat: &str, user: i64) -> Result<(), MessengerError>;

  async fn unban_member(&self, chat: &str, user: i64)
  -> Result<(), MessengerError>;

  /// Direct message; `html` uses the platform's HTML formatting subset.
  async fn notify(&self, user: i64, html: &str) -> Result<(), MessengerError>;
}

/// Numeric ids address chats directly, anything else is a public `@username`.
pub fn recipient(chat: &str) -> Recipient {
  let chat = chat.trim();
  match chat.parse::<i64>() {
    Ok(id) => Recipient::Id(ChatId(id)),
    Err(_) if chat.starts_with('@') => Recipient::ChannelUsername(chat.to_string()),
    Err(_) => Recipient::ChannelUsername(format!("@{chat}")),
  }
}

#[async_trait]
impl Messenger for Bot {
  async fn create_invite(
    &self,
    chat: &str,
    options: InviteOptions,
  ) -> Result<String, MessengerError> {
    let mut request = self
      .create_chat_invite_link(recipient(chat))
      .expire_date(options.expire_at);

    request = if options.creates_join_request {
      request.creates_join_request(true)
    } else {
      request.member_limit(options.member_limit)
    };

    Ok(request.await?.invite_link)
  }

  async fn revoke_invite(
    &self,
    chat: &str,
    link: &str,
  ) -> Result<(), MessengerError> {
    self.revoke_chat_invite_link(recipient(chat), link).await?;
    Ok(())
  }

  async fn ban_member(&self, chat: &str, user: i64) -> Result<(), MessengerError> {
    self.ban_chat_member(recipient(chat), UserId(user as u64)).await?;
    Ok(())
  }

  async fn unban_member(
    &self,
    chat: &str,
    user: i64,
  ) -> Result<(), MessengerError> {
    self.unban_chat_member(recipient(chat), UserId(user as u64)).await?;
    Ok(())
  }

  async fn notify(&self, user: i64, html: &str) -> Result<(), MessengerError> {
    self
      .send_message(ChatId(user), html)
      .parse_mode(ParseMode::Html)
      .await?;
    Ok(())
  }
}

/// Runs `op`, retrying once when the platform asks to wait.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, MessengerError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, MessengerError>>,
{
  match op().await {
    Err(MessengerError::RateLimited(wait)) if wait <= MAX_RETRY_AFTER => {
      tracing::debug!("rate limited, retrying in {wait:?}");
      tokio::time::sleep(wait).await;
      op().await
    }
    result => result,
  }
}
