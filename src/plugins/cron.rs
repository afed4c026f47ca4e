use std::sync::Arc;

use async_trait::async_trait;

use crate::{plugins::Plugin, prelude::*, state::AppState};

/// Drops expired verification tokens.
pub struct TokenSweep;

#[async_trait]
impl Plugin for TokenSweep {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let period = app.config.token_sweep;
    if period.is_zero() {
      info!("token sweep disabled via config (0 interval)");
      return Ok(());
    }

    let mut interval = tokio::time::interval(period);
    loop {
      interval.tick().await;

      let removed = app.tokens.sweep();
      if removed > 0 {
        debug!("swept {removed} expired verification token(s), {} pending", app.tokens.len());
      }
    }
  }
}

/// Hourly reset of failed verification counters; also forgets idle identity
/// locks and old job reports.
pub struct AttemptsReset;

#[async_trait]
impl Plugin for AttemptsReset {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));

    // first tick fires immediately
    interval.tick().await;

    loop {
      interval.tick().await;

      app.attempts.reset();
      app.locks.prune();
      app.jobs.prune(TimeDelta::hours(24));
      debug!("verification attempt counters reset");
    }
  }
}
