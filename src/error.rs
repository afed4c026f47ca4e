use thiserror::Error;

use crate::messenger::MessengerError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Db(#[from] sea_orm::DbErr),

  #[error("json error: {0}")]
  Json(#[from] json::Error),

  #[error("invalid arguments: {0}")]
  InvalidArgs(String),

  #[error("subscriber not found")]
  SubscriberNotFound,

  #[error("channel not found")]
  ChannelNotFound,

  #[error("telegram user is not bound to a subscriber")]
  NotAuthorized,

  #[error("subscriber {0} is inactive")]
  SubscriberInactive(String),

  /// Email and phone do not identify an active subscriber.
  #[error("verification data does not match")]
  VerificationMismatch,

  #[error("verification token is invalid or expired")]
  TokenInvalid,

  #[error("too many verification attempts")]
  TooManyAttempts,

  #[error("messenger error: {0}")]
  Messenger(#[from] MessengerError),

  #[error("internal error: {0}")]
  Internal(String),
}

impl Error {
  /// Text safe to show to end users.
  pub fn user_message(&self) -> String {
    match self {
      Error::InvalidArgs(msg) => msg.clone(),
      Error::SubscriberNotFound => "Subscriber not found.".into(),
      Error::ChannelNotFound => "Channel not found.".into(),
      Error::NotAuthorized => {
        "You are not verified yet. Use /start to verify your subscription."
          .into()
      }
      Error::SubscriberInactive(_) => {
        "Your subscription is not active. Contact support.".into()
      }
      Error::VerificationMismatch => {
        "Data not found. Check your email and phone and try again.".into()
      }
      Error::TokenInvalid => {
        "This verification link is invalid or has expired. Request a new one with /start."
          .into()
      }
      Error::TooManyAttempts => {
        "Too many attempts. Please try again later.".into()
      }
      Error::Messenger(_) => {
        "Telegram is not responding right now. Please try again later.".into()
      }
      Error::Db(_) | Error::Json(_) | Error::Internal(_) => {
        "Internal error. Please try again later.".into()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_user_message_hides_internals() {
    let err = Error::Db(sea_orm::DbErr::Custom("secret table".into()));
    assert!(!err.user_message().contains("secret"));
    assert!(err.to_string().contains("secret table"));
  }

  #[test]
  fn test_invalid_args_passthrough() {
    let err = Error::InvalidArgs("Usage: /revoke <email>".into());
    assert_eq!(err.user_message(), "Usage: /revoke <email>");
  }
}
