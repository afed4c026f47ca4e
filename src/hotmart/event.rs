use json::Value;

use super::first_at;

/// Event names granting access. Each is also accepted with `_` in place of
/// the first `.`, as sent by the newer webhook schema.
const ACTIVATION_EVENTS: &[&str] = &[
  "purchase.approved",
  "purchase.completed",
  "purchase.complete",
  "purchase.finished",
  "subscription.approved",
  "subscription.renewed",
  "subscription.reactivated",
];

const DEACTIVATION_EVENTS: &[&str] = &[
  "purchase.canceled",
  "purchase.cancelled",
  "purchase.chargeback",
  "purchase.refunded",
  "purchase.protest",
  "purchase.dispute",
  "subscription.canceled",
  "subscription.cancelled",
  "subscription.cancellation",
  "subscription.deactivated",
  "subscription.expired",
  "subscription.suspended",
];

const ACTIVATION_STATUSES: &[&str] = &[
  "approved",
  "completed",
  "finished",
  "active",
  "paid",
  "up_to_date",
  "authorized",
  "current",
  "available",
];

const DEACTIVATION_STATUSES: &[&str] = &[
  "refunded",
  "refund_requested",
  "refund_in_process",
  "refund_in_progress",
  "refund_in_analysis",
  "refund_pending",
  "refused",
  "chargeback",
  "chargeback_refunded",
  "chargeback_pending",
  "chargeback_in_process",
  "waiting_chargeback",
  "dispute",
  "disputed",
  "protest",
  "canceled",
  "cancelled",
  "expired",
  "suspended",
  "blocked",
  "overdue",
  "delayed",
  "inactive",
  "unpaid",
];

const EVENT_POINTERS: &[&str] =
  &["/event", "/event_name", "/data/event", "/data/event_name"];

const STATUS_POINTERS: &[&str] = &[
  "/status",
  "/status_name",
  "/data/status",
  "/data/status_name",
  "/data/sale_status",
  "/data/subscriber/status",
  "/data/subscriber/status_name",
  "/data/purchase/status",
  "/data/purchase/status_name",
  "/data/purchase/sale_status",
  "/data/purchase/purchase_status",
  "/data/purchase/original_status",
  "/data/subscription/status",
  "/data/subscription/status_name",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Activate,
  Deactivate,
  Ignore,
}

/// Which signal produced the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  Event,
  Status,
  None,
}

impl Source {
  pub fn as_str(&self) -> &'static str {
    match self {
      Source::Event => "event",
      Source::Status => "status",
      Source::None => "none",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
  pub action: Action,
  pub source: Source,
}

fn normalize(raw: &str) -> String {
  raw.trim().to_lowercase()
}

fn is_event_in(event: &str, table: &[&str]) -> bool {
  table
    .iter()
    .any(|name| *name == event || name.replacen('.', "_", 1) == event)
}

/// Lower-cased event name from whichever field carries it, empty if none.
pub fn event_type(payload: &Value) -> String {
  first_at(payload, EVENT_POINTERS).map(|e| normalize(&e)).unwrap_or_default()
}

/// Lower-cased status keyword used when the event name is not recognised.
pub fn status(payload: &Value) -> String {
  first_at(payload, STATUS_POINTERS).map(|s| normalize(&s)).unwrap_or_default()
}

/// Event tables first, then status tables, else ignore.
pub fn decide(event: &str, status: &str) -> Decision {
  let (event, status) = (normalize(event), normalize(status));

  let (action, source) = if !event.is_empty() && is_event_in(&event, ACTIVATION_EVENTS) {
    (Action::Activate, Source::Event)
  } else if !event.is_empty() && is_event_in(&event, DEACTIVATION_EVENTS) {
    (Action::Deactivate, Source::Event)
  } else if ACTIVATION_STATUSES.contains(&status.as_str()) {
    (Action::Activate, Source::Status)
  } else if DEACTIVATION_STATUSES.contains(&status.as_str()) {
    (Action::Deactivate, Source::Status)
  } else {
    (Action::Ignore, Source::None)
  };

  Decision { action, source }
}

pub fn classify(event: &str, status: &str) -> Action {
  decide(event, status).action
}
