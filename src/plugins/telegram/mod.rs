mod callback;
mod command;

use std::{collections::HashSet, sync::Arc};

use command::{AdminCommand, UserCommand};
use teloxide::{
  Bot,
  dispatching::{Dispatcher, HandlerExt, UpdateFilterExt},
  prelude::*,
  types::{
    BotCommandScope, CallbackQuery, ChatId, InlineKeyboardMarkup, Message,
    ParseMode, Update,
  },
  utils::command::BotCommands,
};

use crate::{prelude::*, state::AppState, utils};

pub struct Plugin;

#[async_trait::async_trait]
impl super::Plugin for Plugin {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    run_bot(app).await;
    Ok(())
  }
}

/// Users see only user commands, admins see both.
async fn setup_commands(bot: &Bot, admins: &HashSet<i64>) {
  if let Err(e) = bot
    .set_my_commands(UserCommand::bot_commands())
    .scope(BotCommandScope::Default)
    .await
  {
    warn!("failed to set default commands: {e}");
  }

  let mut admin_commands = UserCommand::bot_commands();
  admin_commands.extend(AdminCommand::bot_commands());

  for &admin_id in admins {
    if let Err(e) = bot
      .set_my_commands(admin_commands.clone())
      .scope(BotCommandScope::Chat { chat_id: ChatId(admin_id).into() })
      .await
    {
      warn!("failed to set admin commands for {admin_id}: {e}");
    }
  }

  info!(
    "command hints configured: {} user commands, {} admin commands",
    UserCommand::bot_commands().len(),
    AdminCommand::bot_commands().len()
  );
}

pub async fn run_bot(app: Arc<AppState>) {
  info!("starting telegram bot...");

  let bot = app.bot.clone();
  setup_commands(&bot, &app.config.admins).await;

  let handler = teloxide::dptree::entry()
    .branch(Update::filter_message().filter_command::<UserCommand>().endpoint({
      let app = app.clone();
      move |bot: Bot, msg: Message, cmd: UserCommand| {
        let app = app.clone();
        command::handle(app, ReplyBot::from_message(bot, &msg), cmd)
      }
    }))
    .branch(Update::filter_message().filter_command::<AdminCommand>().endpoint({
      let app = app.clone();
      move |bot: Bot, msg: Message, cmd: AdminCommand| {
        let app = app.clone();
        command::handle_admin(app, ReplyBot::from_message(bot, &msg), cmd)
      }
    }))
    .branch(Update::filter_callback_query().endpoint({
      let app = app.clone();
      move |bot: Bot, query: CallbackQuery| {
        let app = app.clone();
        callback_handle(app, bot, query)
      }
    }));

  Dispatcher::builder(bot, handler).build().dispatch().await;
}

async fn callback_handle(
  app: Arc<AppState>,
  bot: Bot,
  query: CallbackQuery,
) -> ResponseResult<()> {
  if let Some(data) = query.data
    && let Some(msg) = query.message.as_ref()
  {
    let bot = ReplyBot::new(bot, query.from.id.0 as i64, msg.chat().id);

    // clears the button's loading state
    bot.inner.answer_callback_query(query.id.clone()).await?;

    callback::handle(app, bot, &data).await
  } else {
    Ok(())
  }
}

#[derive(Debug, Clone)]
struct ReplyBot {
  inner: Bot,
  pub user_id: i64,
  pub chat_id: ChatId,
}

impl ReplyBot {
  pub fn new(inner: Bot, user_id: i64, chat_id: ChatId) -> Self {
    Self { inner, user_id, chat_id }
  }

  fn from_message(inner: Bot, msg: &Message) -> Self {
    let user_id = msg.from.as_ref().map_or(msg.chat.id.0, |u| u.id.0 as i64);
    Self::new(inner, user_id, msg.chat.id)
  }

  async fn reply_html(
    &self,
    text: impl Into<String>,
  ) -> ResponseResult<Message> {
    self
      .inner
      .send_message(self.chat_id, text.into())
      .parse_mode(ParseMode::Html)
      .await
  }

  /// Long texts go out as several messages; returns the last one.
  async fn reply_html_chunked(
    &self,
    text: impl Into<String>,
  ) -> ResponseResult<Option<Message>> {
    let mut last = None;
    for chunk in utils::chunk_message(&text.into(), 0) {
      last = Some(self.reply_html(chunk).await?);
    }
    Ok(last)
  }

  async fn reply_with_keyboard(
    &self,
    text: impl Into<String>,
    keyboard: InlineKeyboardMarkup,
  ) -> ResponseResult<Message> {
    self
      .inner
      .send_message(self.chat_id, text.into())
      .parse_mode(ParseMode::Html)
      .reply_markup(keyboard)
      .await
  }
}
