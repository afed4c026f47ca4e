use std::sync::Arc;

use teloxide::{
  prelude::*,
  utils::{
    command::{BotCommands, ParseError},
    html::escape,
  },
};

use super::{ReplyBot, callback};
use crate::{
  entity::{SubscriberStatus, subscriber},
  prelude::*,
  state::{AppState, Services},
  sv::{
    channel::NewChannel,
    subscriber::{NewSubscriber, SubscriberUpdate},
  },
  utils,
};

fn parse_set_plans(
  input: String,
) -> std::result::Result<(String, String), ParseError> {
  let mut parts = input.trim().splitn(2, char::is_whitespace);
  let email = parts.next().unwrap_or_default().to_string();
  let plans = parts.next().unwrap_or_default().trim().to_string();

  if email.is_empty() || plans.is_empty() {
    return Err(ParseError::IncorrectFormat(
      "Usage: /setplans <email> <plan>[, <plan>...]".into(),
    ));
  }
  Ok((email, plans))
}

/// `a | b | c` into trimmed fields.
fn fields(input: &str) -> Vec<&str> {
  input.split('|').map(str::trim).collect()
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum UserCommand {
  #[command(description = "verify your subscription")]
  Start,
  #[command(description = "get fresh invite links")]
  Channels,
  #[command(description = "show help")]
  Help,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum AdminCommand {
  #[command(description = "revoke access and delete a subscriber")]
  Revoke(String),
  #[command(description = "revoke identities of inactive subscribers")]
  Sync,
  #[command(description = "subscriber details")]
  Info(String),
  #[command(description = "activate a subscriber")]
  Activate(String),
  #[command(description = "deactivate a subscriber")]
  Deactivate(String),
  #[command(description = "replace a subscriber's plans", parse_with = parse_set_plans)]
  SetPlans { email: String, plans: String },
  #[command(description = "add a subscriber")]
  AddSub(String),
  #[command(description = "list channels")]
  Chans,
  #[command(description = "add a channel")]
  AddChan(String),
  #[command(description = "enable or disable a channel")]
  ToggleChan(String),
  #[command(description = "delete a channel")]
  DelChan(String),
  #[command(description = "recent authorization log")]
  Logs(String),
  #[command(description = "access statistics")]
  Stats,
}

const ADMIN_HELP: &str = "\
<b>📋 Admin Commands</b>

<b>Subscribers:</b>
/info &lt;email&gt; - Subscriber details and bindings
/activate &lt;email&gt; - Mark active, re-enable bound users
/deactivate &lt;email&gt; - Mark inactive and revoke access
/setplans &lt;email&gt; &lt;plans&gt; - Replace plans (comma separated)
/addsub &lt;email&gt; | &lt;name&gt; | &lt;phone&gt; | &lt;plans&gt; - Add manually
/revoke &lt;email&gt; - Revoke everything and delete the subscriber

<b>Channels:</b>
/chans - List channels
/addchan &lt;chat_id&gt; | &lt;name&gt; | &lt;plan&gt; [| &lt;order&gt;] - Add a channel (plan <code>all</code> for everyone)
/togglechan &lt;id&gt; - Enable or disable a channel
/delchan &lt;id&gt; - Delete a channel

<b>System:</b>
/sync - Revoke identities bound to inactive subscribers
/logs [n] - Recent authorization log
/stats - Access statistics
/help - Show this message";

pub async fn handle(
  app: Arc<AppState>,
  bot: ReplyBot,
  cmd: UserCommand,
) -> ResponseResult<()> {
  match cmd {
    UserCommand::Start => {
      let binding = app.sv().auth.with_subscriber(bot.user_id).await;
      let verified = matches!(
        &binding,
        Ok(Some((user, sub))) if user.authorized && sub.is_active()
      );

      let text = if verified {
        "👋 <b>Welcome back!</b>\n\n\
        Your subscription is verified. Use the button below or /channels \
        to get fresh invite links."
      } else {
        "👋 <b>Welcome!</b>\n\n\
        To join the subscriber channels, verify your identity with the email \
        and phone you used at checkout."
      };
      bot.reply_with_keyboard(text, callback::start_menu(verified)).await?;
    }
    UserCommand::Channels => send_channels(&app, &bot).await?,
    UserCommand::Help if app.is_admin(bot.user_id) => {
      bot.reply_html(ADMIN_HELP).await?;
    }
    UserCommand::Help => {
      bot
        .reply_html(format!(
          "/start - verify your subscription\n\
          /channels - get fresh invite links\n\n\
          Need help? Contact {}",
          app.config.support_username
        ))
        .await?;
    }
  }
  Ok(())
}

/// Revokes the caller's outstanding links and sends new ones.
pub async fn send_channels(app: &AppState, bot: &ReplyBot) -> ResponseResult<()> {
  let sv = app.sv();

  bot.reply_html("⏳ Generating your links...").await?;
  match sv.access.refresh_invites(bot.user_id).await {
    Ok((subscriber, report)) => {
      bot.reply_html(sv.access.links_message(&subscriber, &report)).await?;
    }
    Err(e) => {
      bot.reply_html(format!("❌ {}", escape(&e.user_message()))).await?;
    }
  }
  Ok(())
}

async fn subscriber_by_email(
  sv: &Services<'_>,
  email: &str,
) -> Result<subscriber::Model> {
  if email.trim().is_empty() {
    return Err(Error::InvalidArgs("An email is required".into()));
  }
  sv.subscriber.by_email(email).await?.ok_or(Error::SubscriberNotFound)
}

fn describe(subscriber: &subscriber::Model) -> String {
  let status = match subscriber.status {
    SubscriberStatus::Active => "🟢 active",
    SubscriberStatus::Inactive => "🔴 inactive",
  };
  format!(
    "<b>{}</b> (#{})\n\
    Email: <code>{}</code>\n\
    Phone: <code>{}</code>\n\
    Plans: {}\n\
    Status: {status}\n\
    Origin: {:?}\n\
    Created: {}",
    escape(&subscriber.name),
    subscriber.id,
    escape(&subscriber.email),
    escape(&subscriber.phone),
    escape(&subscriber.plan_set().to_string()),
    subscriber.origin,
    utils::format_date(subscriber.created_at)
  )
}

async fn info(sv: &Services<'_>, email: &str) -> Result<String> {
  let subscriber = subscriber_by_email(sv, email).await?;
  let mut text = describe(&subscriber);

  let bindings = sv.auth.by_subscriber(subscriber.id).await?;
  if bindings.is_empty() {
    text.push_str("\n\nNo Telegram account bound.");
  } else {
    text.push_str("\n\n<b>Telegram:</b>\n");
    for user in bindings {
      let mark = if user.authorized { "✅" } else { "⛔" };
      text.push_str(&format!(
        "{mark} <code>{}</code> since {}\n",
        user.telegram_id,
        utils::format_date(user.authorized_at)
      ));
    }
  }

  let logs = sv.auth.logs_for_subscriber(subscriber.id).await?;
  if !logs.is_empty() {
    text.push_str("\n<b>Recent log:</b>\n");
    for log in logs.iter().rev().take(5) {
      text.push_str(&format!(
        "{} {:?} {}\n",
        utils::format_date(log.timestamp),
        log.action,
        escape(log.context.as_deref().unwrap_or_default())
      ));
    }
  }
  Ok(text)
}

async fn add_subscriber(sv: &Services<'_>, args: &str) -> Result<String> {
  let parts = fields(args);
  let [email, name, phone, plans] = parts[..] else {
    return Err(Error::InvalidArgs(
      "Usage: /addsub <email> | <name> | <phone> | <plans>".into(),
    ));
  };

  let subscriber = sv
    .subscriber
    .create(NewSubscriber {
      name: name.to_string(),
      email: email.to_string(),
      phone: phone.to_string(),
      plans: PlanSet::from_raw(plans),
      ..Default::default()
    })
    .await?;
  Ok(format!("✅ Subscriber added\n\n{}", describe(&subscriber)))
}

async fn add_channel(sv: &Services<'_>, args: &str) -> Result<String> {
  let parts = fields(args);
  let (chat_id, name, plan, ordering) = match parts[..] {
    [chat_id, name, plan] => (chat_id, name, plan, 0),
    [chat_id, name, plan, ordering] => {
      let ordering = ordering
        .parse()
        .map_err(|_| Error::InvalidArgs("Order must be a number".into()))?;
      (chat_id, name, plan, ordering)
    }
    _ => {
      return Err(Error::InvalidArgs(
        "Usage: /addchan <chat_id> | <name> | <plan> [| <order>]".into(),
      ));
    }
  };

  let channel = sv
    .channel
    .create(NewChannel {
      name: name.to_string(),
      chat_id: Some(chat_id.to_string()),
      plan: plan.to_string(),
      ordering,
      ..Default::default()
    })
    .await?;
  Ok(format!(
    "✅ Channel <b>{}</b> (#{}) added for plan <code>{}</code>",
    escape(&channel.name),
    channel.id,
    escape(&channel.plan)
  ))
}

async fn list_channels(sv: &Services<'_>) -> Result<String> {
  let channels = sv.channel.all().await?;
  if channels.is_empty() {
    return Ok("📭 No channels configured.".into());
  }

  let mut text = format!("📺 <b>Channels ({})</b>\n\n", channels.len());
  for c in channels {
    text.push_str(&format!(
      "{} <b>#{}</b> {} - plan <code>{}</code>, chat <code>{}</code>, order {}\n",
      if c.active { "🟢" } else { "⚪" },
      c.id,
      escape(&c.name),
      escape(&c.plan),
      c.chat_id.as_deref().unwrap_or("-"),
      c.ordering
    ));
  }
  Ok(text)
}

fn channel_id(args: &str, usage: &str) -> Result<i32> {
  args.trim().parse().map_err(|_| Error::InvalidArgs(usage.into()))
}

pub async fn handle_admin(
  app: Arc<AppState>,
  bot: ReplyBot,
  cmd: AdminCommand,
) -> ResponseResult<()> {
  if !app.is_admin(bot.user_id) {
    return Ok(());
  }

  let sv = app.sv();

  let result: Result<String> = match cmd {
    AdminCommand::Revoke(email) => {
      bot.reply_html("⏳ Revoking access...").await?;
      match subscriber_by_email(&sv, &email).await {
        Ok(sub) => sv.access.remove_subscriber(sub.id, true).await.map(|removal| {
          let Some(removal) = removal else {
            return "Subscriber already removed.".to_string();
          };
          let failed: usize = removal.revocations.iter().map(|r| r.failed.len()).sum();
          format!(
            "✅ <code>{}</code> removed\n\
            Identities revoked: {}\n\
            Users notified: {}\n\
            Channel failures: {failed}",
            escape(&removal.subscriber.email),
            removal.revocations.len(),
            removal.notified
          )
        }),
        Err(e) => Err(e),
      }
    }

    AdminCommand::Sync => {
      bot.reply_html("⏳ Synchronizing...").await?;
      sv.access.sync_inactive().await.map(|report| {
        format!(
          "✅ Sync finished\nIdentities revoked: {}\nChannel failures: {}",
          report.revoked.len(),
          report.failed_channels
        )
      })
    }

    AdminCommand::Info(email) => info(&sv, &email).await,

    AdminCommand::Activate(email) => {
      async {
        let sub = subscriber_by_email(&sv, &email).await?;
        let change = sv
          .access
          .update_subscriber(sub.id, SubscriberUpdate {
            status: Some(SubscriberStatus::Active),
            ..Default::default()
          })
          .await?;
        Ok(format!(
          "✅ {} activated, {} bound user(s) re-enabled",
          escape(&change.after.email),
          change.telegram_ids.len()
        ))
      }
      .await
    }

    AdminCommand::Deactivate(email) => {
      async {
        let sub = subscriber_by_email(&sv, &email).await?;
        let change = sv
          .access
          .update_subscriber(sub.id, SubscriberUpdate {
            status: Some(SubscriberStatus::Inactive),
            ..Default::default()
          })
          .await?;
        Ok(format!(
          "✅ {} deactivated, access revoked for {} user(s)",
          escape(&change.after.email),
          change.telegram_ids.len()
        ))
      }
      .await
    }

    AdminCommand::SetPlans { email, plans } => {
      async {
        let sub = subscriber_by_email(&sv, &email).await?;
        let plans = PlanSet::from_raw(&plans);
        if plans.is_empty() {
          return Err(Error::InvalidArgs("At least one plan is required".into()));
        }
        let change = sv
          .access
          .update_subscriber(sub.id, SubscriberUpdate {
            plans: Some(plans),
            ..Default::default()
          })
          .await?;
        let removed = change.removed_plans();
        Ok(format!(
          "✅ Plans of {} set to {}{}",
          escape(&change.after.email),
          escape(&change.after.plan_set().to_string()),
          if removed.is_empty() {
            String::new()
          } else {
            format!("\nRevoked: {}", escape(&removed.to_string()))
          }
        ))
      }
      .await
    }

    AdminCommand::AddSub(args) => add_subscriber(&sv, &args).await,
    AdminCommand::Chans => list_channels(&sv).await,
    AdminCommand::AddChan(args) => add_channel(&sv, &args).await,

    AdminCommand::ToggleChan(args) => {
      async {
        let id = channel_id(&args, "Usage: /togglechan <id>")?;
        let channel = sv.channel.by_id(id).await?;
        let channel = sv.channel.set_active(id, !channel.active).await?;
        Ok(format!(
          "✅ Channel <b>{}</b> is now {}",
          escape(&channel.name),
          if channel.active { "enabled" } else { "disabled" }
        ))
      }
      .await
    }

    AdminCommand::DelChan(args) => {
      async {
        let id = channel_id(&args, "Usage: /delchan <id>")?;
        sv.channel.delete(id).await?;
        Ok(format!("🗑 Channel #{id} deleted"))
      }
      .await
    }

    AdminCommand::Logs(args) => {
      let limit = args.trim().parse().unwrap_or(20u64).clamp(1, 100);
      sv.auth.logs(limit).await.map(|logs| {
        if logs.is_empty() {
          return "📭 Log is empty.".to_string();
        }
        let mut text = format!("📜 <b>Last {} entries</b>\n\n", logs.len());
        for log in logs {
          text.push_str(&format!(
            "{} {:?} tg:{} sub:{} {}\n",
            utils::format_date(log.timestamp),
            log.action,
            log.telegram_id.map_or("-".into(), |id| id.to_string()),
            log.subscriber_id.map_or("-".into(), |id| id.to_string()),
            escape(log.context.as_deref().unwrap_or_default())
          ));
        }
        text
      })
    }

    AdminCommand::Stats => sv.subscriber.stats().await.map(|stats| {
      let mut text = format!(
        "📊 <b>Statistics</b>\n\n\
        Authorized users: {}\n\
        Active subscribers: {}\n\
        Total subscribers: {}\n",
        stats.authorized_users, stats.active_subscribers, stats.total_subscribers
      );
      if !stats.by_plan.is_empty() {
        text.push_str("\n<b>Authorized per plan:</b>\n");
        for (plan, count) in &stats.by_plan {
          text.push_str(&format!("• {}: {count}\n", escape(plan)));
        }
      }
      text
    }),
  };

  match result {
    Ok(text) => {
      bot.reply_html_chunked(text).await?;
    }
    Err(e) => {
      bot.reply_html(format!("❌ {}", escape(&e.user_message()))).await?;
    }
  }

  Ok(())
}
