use std::{collections::HashSet, env, str::FromStr, time::Duration};

use anyhow::Context;

use crate::hotmart::PlanMap;

/// Pauses between successive platform calls inside a sweep.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
  pub invite: Duration,
  pub revoke: Duration,
  pub ban: Duration,
  pub batch_size: usize,
  pub batch: Duration,
}

impl Default for Pacing {
  fn default() -> Self {
    Self {
      invite: Duration::from_millis(500),
      revoke: Duration::from_millis(300),
      ban: Duration::from_millis(500),
      batch_size: 10,
      batch: Duration::from_secs(2),
    }
  }
}

impl Pacing {
  #[cfg(test)]
  pub fn none() -> Self {
    Self {
      invite: Duration::ZERO,
      revoke: Duration::ZERO,
      ban: Duration::ZERO,
      batch_size: 10,
      batch: Duration::ZERO,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub admins: HashSet<i64>,
  pub port: u16,
  pub webhook_secret: String,
  pub plan_map: PlanMap,
  pub web_app_url: Option<String>,
  pub support_username: String,
  pub admin_api_token: Option<String>,
  pub invite_ttl: Duration,
  pub token_ttl: Duration,
  pub token_sweep: Duration,
  pub max_attempts: u32,
  pub pacing: Pacing,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: "sqlite:subgate.db?mode=rwc".into(),
      admins: HashSet::new(),
      port: 3000,
      webhook_secret: String::new(),
      plan_map: PlanMap::default(),
      web_app_url: None,
      support_username: "@support".into(),
      admin_api_token: None,
      invite_ttl: Duration::from_secs(72 * 3600),
      token_ttl: Duration::from_secs(15 * 60),
      token_sweep: Duration::from_secs(5 * 60),
      max_attempts: 5,
      pacing: Pacing::default(),
    }
  }
}

fn var(key: &str) -> Option<String> {
  env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match var(key) {
    Some(raw) => raw.parse().with_context(|| format!("invalid {key}: {raw}")),
    None => Ok(default),
  }
}

fn duration(key: &str, default: Duration) -> anyhow::Result<Duration> {
  match var(key) {
    Some(raw) => humantime::parse_duration(&raw)
      .with_context(|| format!("invalid {key}: {raw}")),
    None => Ok(default),
  }
}

pub fn parse_admins(raw: &str) -> HashSet<i64> {
  raw
    .split(',')
    .filter_map(|id| id.trim().parse().ok())
    .collect()
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let defaults = Self::default();
    let pacing = defaults.pacing;

    let default_plan = var("HOTMART_DEFAULT_PLAN").or_else(|| var("DEFAULT_PLAN"));
    let plan_map = PlanMap::from_json(
      &var("HOTMART_PLAN_MAP").unwrap_or_default(),
      default_plan,
    )
    .context("HOTMART_PLAN_MAP must be a JSON object")?;

    Ok(Self {
      database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
      admins: var("ADMIN_IDS").map(|raw| parse_admins(&raw)).unwrap_or_default(),
      port: parsed("PORT", defaults.port)?,
      webhook_secret: var("HOTMART_WEBHOOK_SECRET").unwrap_or_default(),
      plan_map,
      web_app_url: var("WEB_APP_URL").map(|url| url.trim_end_matches('/').to_string()),
      support_username: var("SUPPORT_USERNAME").unwrap_or(defaults.support_username),
      admin_api_token: var("ADMIN_API_TOKEN"),
      invite_ttl: duration("INVITE_TTL", defaults.invite_ttl)?,
      token_ttl: duration("VERIFY_TOKEN_TTL", defaults.token_ttl)?,
      token_sweep: duration("VERIFY_TOKEN_SWEEP", defaults.token_sweep)?,
      max_attempts: parsed("VERIFY_MAX_ATTEMPTS", defaults.max_attempts)?,
      pacing: Pacing {
        invite: duration("INVITE_DELAY", pacing.invite)?,
        revoke: duration("REVOKE_DELAY", pacing.revoke)?,
        ban: duration("BAN_DELAY", pacing.ban)?,
        batch_size: parsed("REMOVAL_BATCH_SIZE", pacing.batch_size)?,
        batch: duration("REMOVAL_BATCH_DELAY", pacing.batch)?,
      },
    })
  }

  pub fn is_admin(&self, telegram_id: i64) -> bool {
    self.admins.contains(&telegram_id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_admins() {
    let admins = parse_admins("1, 2,abc,,-100");
    assert_eq!(admins, HashSet::from([1, 2, -100]));
    assert!(parse_admins("").is_empty());
  }

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.invite_ttl, Duration::from_secs(259_200));
    assert_eq!(config.token_ttl, Duration::from_secs(900));
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.pacing.batch_size, 10);
    assert!(config.webhook_secret.is_empty());
  }
}
