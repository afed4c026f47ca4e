use std::sync::Arc;

use teloxide::{
  prelude::*,
  types::{InlineKeyboardButton, InlineKeyboardMarkup},
};

use super::ReplyBot;
use crate::{prelude::*, state::AppState};

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
  VerifyIdentity,
  Channels,
}

impl Callback {
  pub fn to_data(&self) -> String {
    match self {
      Callback::VerifyIdentity => "verify".to_string(),
      Callback::Channels => "channels".to_string(),
    }
  }

  pub fn from_data(data: &str) -> Option<Self> {
    match data {
      "verify" => Some(Callback::VerifyIdentity),
      "channels" => Some(Callback::Channels),
      _ => None,
    }
  }
}

pub fn start_menu(verified: bool) -> InlineKeyboardMarkup {
  let button = if verified {
    InlineKeyboardButton::callback("📨 Get my links", Callback::Channels.to_data())
  } else {
    InlineKeyboardButton::callback(
      "✅ Verify identity",
      Callback::VerifyIdentity.to_data(),
    )
  };
  InlineKeyboardMarkup::new(vec![vec![button]])
}

pub async fn handle(
  app: Arc<AppState>,
  bot: ReplyBot,
  data: &str,
) -> ResponseResult<()> {
  let Some(callback) = Callback::from_data(data) else {
    debug!("unknown callback data `{data}` from {}", bot.user_id);
    return Ok(());
  };

  match callback {
    Callback::VerifyIdentity => send_verification_link(&app, &bot).await,
    Callback::Channels => super::command::send_channels(&app, &bot).await,
  }
}

pub async fn send_verification_link(
  app: &AppState,
  bot: &ReplyBot,
) -> ResponseResult<()> {
  let Some(link) = app.verification().link(bot.user_id) else {
    warn!("verification requested by {} but WEB_APP_URL is not set", bot.user_id);
    bot
      .reply_html(format!(
        "⚠️ Verification is unavailable right now. Contact {}.",
        app.config.support_username
      ))
      .await?;
    return Ok(());
  };

  bot
    .reply_html(format!(
      "🔐 <b>Verify your subscription</b>\n\n\
      Open the link below and enter the email and phone used at checkout:\n\
      {link}\n\n\
      The link is valid for {} and works once.",
      humantime::format_duration(app.config.token_ttl)
    ))
    .await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_callback_data() {
    for callback in [Callback::VerifyIdentity, Callback::Channels] {
      assert_eq!(Callback::from_data(&callback.to_data()), Some(callback));
    }
    assert_eq!(Callback::from_data("profile"), None);
  }
}
