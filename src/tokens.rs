//! In-process verification tokens, failed-attempt counters and per-identity
//! locks.
//!
//! All of it lives only in memory; a restart drops pending verifications and
//! the user simply requests a new link.

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
  pub telegram_id: i64,
  pub created_at: Instant,
  pub expires_at: Instant,
}

impl Pending {
  pub fn expires_in(&self, now: Instant) -> Duration {
    self.expires_at.saturating_duration_since(now)
  }
}

/// Single-use tokens binding a Telegram identity to a verification attempt.
pub struct TokenStore {
  ttl: Duration,
  tokens: DashMap<String, Pending>,
}

impl TokenStore {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl, tokens: DashMap::new() }
  }

  /// 32 random bytes, hex encoded.
  pub fn issue(&self, telegram_id: i64) -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = hex::encode(bytes);

    let now = Instant::now();
    self.tokens.insert(token.clone(), Pending {
      telegram_id,
      created_at: now,
      expires_at: now + self.ttl,
    });
    token
  }

  /// Expired entries are removed on lookup.
  pub fn validate(&self, token: &str) -> Option<Pending> {
    self.validate_at(token, Instant::now())
  }

  fn validate_at(&self, token: &str, now: Instant) -> Option<Pending> {
    let pending = *self.tokens.get(token)?;
    if now >= pending.expires_at {
      self.tokens.remove(token);
      return None;
    }
    Some(pending)
  }

  /// Removes the token; only one caller ever gets `Some` for a given token.
  /// Expired tokens are removed and yield `None`.
  pub fn consume(&self, token: &str) -> Option<Pending> {
    self.consume_at(token, Instant::now())
  }

  fn consume_at(&self, token: &str, now: Instant) -> Option<Pending> {
    let (_, pending) = self.tokens.remove(token)?;
    (now < pending.expires_at).then_some(pending)
  }

  /// Drops every expired token, returning how many were removed.
  pub fn sweep(&self) -> usize {
    self.sweep_at(Instant::now())
  }

  fn sweep_at(&self, now: Instant) -> usize {
    let before = self.tokens.len();
    self.tokens.retain(|_, pending| now < pending.expires_at);
    before.saturating_sub(self.tokens.len())
  }

  pub fn len(&self) -> usize {
    self.tokens.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tokens.is_empty()
  }
}

/// Failed verification counters per Telegram identity.
pub struct Attempts {
  max: u32,
  failures: DashMap<i64, u32>,
}

impl Attempts {
  pub fn new(max: u32) -> Self {
    Self { max, failures: DashMap::new() }
  }

  pub fn is_blocked(&self, telegram_id: i64) -> bool {
    self.failures.get(&telegram_id).is_some_and(|n| *n >= self.max)
  }

  /// Returns the updated failure count.
  pub fn record_failure(&self, telegram_id: i64) -> u32 {
    let mut count = self.failures.entry(telegram_id).or_insert(0);
    *count += 1;
    *count
  }

  pub fn clear(&self, telegram_id: i64) {
    self.failures.remove(&telegram_id);
  }

  pub fn reset(&self) {
    self.failures.clear();
  }
}

/// One async mutex per Telegram identity, serializing revoke-then-issue so
/// an identity never holds two live links into the same channel.
#[derive(Default)]
pub struct IdentityLocks {
  locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl IdentityLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn lock(&self, telegram_id: i64) -> OwnedMutexGuard<()> {
    let lock = self.locks.entry(telegram_id).or_default().clone();
    lock.lock_owned().await
  }

  /// Forgets locks nobody holds or waits on.
  pub fn prune(&self) -> usize {
    let before = self.locks.len();
    self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    before.saturating_sub(self.locks.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_issue_is_random_hex() {
    let store = TokenStore::new(Duration::from_secs(60));
    let a = store.issue(1);
    let b = store.issue(1);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
    assert_eq!(store.len(), 2);
  }

  #[test]
  fn test_single_use() {
    let store = TokenStore::new(Duration::from_secs(60));
    let token = store.issue(42);

    let pending = store.validate(&token).unwrap();
    assert_eq!(pending.telegram_id, 42);
    assert!(store.consume(&token).is_some());
    assert!(store.validate(&token).is_none());
    assert!(store.consume(&token).is_none());
  }

  #[test]
  fn test_consume_rejects_expired() {
    let store = TokenStore::new(Duration::from_secs(60));
    let token = store.issue(42);

    let later = Instant::now() + Duration::from_secs(61);
    assert!(store.consume_at(&token, later).is_none());
    assert!(store.is_empty());
  }

  #[tokio::test]
  async fn test_identity_locks() {
    let locks = IdentityLocks::new();

    let guard = locks.lock(1).await;
    assert!(locks.locks.get(&1).unwrap().try_lock().is_err());
    // other identities are independent
    drop(locks.lock(2).await);

    assert_eq!(locks.prune(), 1);
    drop(guard);
    assert_eq!(locks.prune(), 1);
    assert!(locks.locks.is_empty());
  }

  #[test]
  fn test_expired_lookup_deletes() {
    let store = TokenStore::new(Duration::from_secs(60));
    let token = store.issue(42);

    let later = Instant::now() + Duration::from_secs(61);
    assert!(store.validate_at(&token, later).is_none());
    assert!(store.is_empty());
    assert!(store.validate("unknown").is_none());
  }

  #[test]
  fn test_sweep() {
    let store = TokenStore::new(Duration::from_secs(60));
    store.issue(1);
    store.issue(2);

    assert_eq!(store.sweep(), 0);
    assert_eq!(store.sweep_at(Instant::now() + Duration::from_secs(120)), 2);
    assert!(store.is_empty());
  }

  #[test]
  fn test_expires_in() {
    let store = TokenStore::new(Duration::from_secs(900));
    let token = store.issue(1);
    let pending = store.validate(&token).unwrap();
    assert!(pending.expires_in(pending.created_at) == Duration::from_secs(900));
    assert_eq!(pending.expires_in(pending.expires_at + Duration::from_secs(1)), Duration::ZERO);
  }

  #[test]
  fn test_attempts() {
    let attempts = Attempts::new(3);
    for _ in 0..2 {
      attempts.record_failure(7);
    }
    assert!(!attempts.is_blocked(7));
    assert_eq!(attempts.record_failure(7), 3);
    assert!(attempts.is_blocked(7));
    assert!(!attempts.is_blocked(8));

    attempts.clear(7);
    assert!(!attempts.is_blocked(7));

    attempts.record_failure(9);
    attempts.reset();
    assert_eq!(attempts.record_failure(9), 1);
  }
}
