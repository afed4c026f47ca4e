//! Background jobs that outlive the request that started them.
//!
//! A job's failures are logged and kept in its report; the caller that
//! started it already got its response and never sees them.

use std::{future::Future, time::Duration};

use dashmap::DashMap;
use futures::future;
use serde::Serialize;
use uuid::Uuid;

use crate::prelude::*;

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
  pub id: Uuid,
  pub kind: &'static str,
  pub total: usize,
  pub processed: usize,
  pub failures: Vec<String>,
  pub finished: bool,
  pub started_at: DateTime,
  pub finished_at: Option<DateTime>,
}

#[derive(Default)]
pub struct Jobs {
  reports: DashMap<Uuid, JobReport>,
}

impl Jobs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn start(&self, kind: &'static str, total: usize) -> Uuid {
    let id = Uuid::new_v4();
    self.reports.insert(id, JobReport {
      id,
      kind,
      total,
      processed: 0,
      failures: Vec::new(),
      finished: total == 0,
      started_at: Utc::now().naive_utc(),
      finished_at: (total == 0).then(|| Utc::now().naive_utc()),
    });
    id
  }

  pub fn get(&self, id: Uuid) -> Option<JobReport> {
    self.reports.get(&id).map(|r| r.clone())
  }

  fn record(&self, id: Uuid, failure: Option<String>) {
    if let Some(mut report) = self.reports.get_mut(&id) {
      report.processed += 1;
      report.failures.extend(failure);
    }
  }

  pub fn finish(&self, id: Uuid) {
    if let Some(mut report) = self.reports.get_mut(&id) {
      report.finished = true;
      report.finished_at = Some(Utc::now().naive_utc());
    }
  }

  /// Forgets finished jobs older than `age`.
  pub fn prune(&self, age: TimeDelta) {
    let cutoff = Utc::now().naive_utc() - age;
    self.reports.retain(|_, r| !r.finished || r.started_at > cutoff);
  }

  /// Runs `op` over `items` in batches of `size`, concurrently within a batch
  /// and pausing `delay` between batches, then marks the job finished.
  pub async fn run_batched<T, F, Fut>(
    &self,
    id: Uuid,
    items: Vec<T>,
    size: usize,
    delay: Duration,
    op: F,
  ) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = std::result::Result<(), String>>,
  {
    let size = size.max(1);
    let mut items = items.into_iter().peekable();
    let mut batch_no = 0;

    while items.peek().is_some() {
      if batch_no > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      batch_no += 1;

      let batch: Vec<_> = items.by_ref().take(size).map(&op).collect();
      for result in future::join_all(batch).await {
        if let Err(failure) = &result {
          warn!("job {id}: {failure}");
        }
        self.record(id, result.err());
      }
    }

    self.finish(id);
    if let Some(report) = self.get(id) {
      info!(
        "job {id} ({}) finished: {}/{} processed, {} failed",
        report.kind,
        report.processed,
        report.total,
        report.failures.len()
      );
    }
  }
}
