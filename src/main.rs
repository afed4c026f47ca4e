mod config;
mod entity;
mod error;
mod hotmart;
mod jobs;
mod messenger;
mod phone;
mod plans;
mod plugins;
mod prelude;
mod state;
mod sv;
mod tokens;
mod utils;

use anyhow::Context;
use teloxide::Bot;
use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{
  config::Config,
  plugins::{App, cron, server, telegram},
  prelude::*,
  state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "subgate=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  let token =
    std::env::var("TELOXIDE_TOKEN").context("TELOXIDE_TOKEN not set")?;

  info!("starting subgate v{}", env!("CARGO_PKG_VERSION"));

  if config.webhook_secret.is_empty() {
    warn!("HOTMART_WEBHOOK_SECRET is empty, every webhook will be rejected");
  }
  if config.admin_api_token.is_none() {
    info!("ADMIN_API_TOKEN not set, admin HTTP routes disabled");
  }

  let db = Database::connect(config.database_url.as_str())
    .await
    .with_context(|| format!("failed to open {}", config.database_url))?;
  migration::Migrator::up(&db, None).await.context("migration failed")?;

  let app = Arc::new(AppState::new(db, Bot::new(token), config));

  App::new()
    .register(server::Plugin)
    .register(telegram::Plugin)
    .register(cron::TokenSweep)
    .register(cron::AttemptsReset)
    .run(app)
    .await;

  Ok(())
}
