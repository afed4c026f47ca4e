use std::collections::HashMap;

use json::Value;

use super::{SubscriberData, text};

/// Products that must resolve even when the configured map lags behind.
const BUILTIN: &[(&str, &str)] = &[
  ("6558190", "Mentoria Renda Turbinada"),
  ("renda turbinada", "Mentoria Renda Turbinada"),
  ("mentoria renda turbinada", "Mentoria Renda Turbinada"),
  ("5060609", "Close Friends LITE"),
  ("3129181", "Close Friends LITE"),
  ("1874171", "Close Friends LITE"),
  ("3671256", "Close Friends LITE"),
  ("close friends lite", "Close Friends LITE"),
  ("5060349", "CF VIP - FATOS DA BOLSA 1"),
  ("1650879", "CF VIP - FATOS DA BOLSA 2"),
  ("3670772", "CF VIP - FATOS DA BOLSA 2"),
  ("1128762", "CF VIP - FATOS DA BOLSA 3"),
  ("1762716", "CF VIP - FATOS DA BOLSA 3"),
  ("2163067", "CF VIP - FATOS DA BOLSA 3"),
  ("2947386", "CF VIP - FATOS DA BOLSA 3"),
  ("cf vip - fatos da bolsa 3", "CF VIP - FATOS DA BOLSA 3"),
  ("3547657", "Projeto Renda Passiva"),
  ("projeto renda passiva", "Projeto Renda Passiva"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
  /// Found through the configured or built-in map.
  Mapped,
  /// The payload's own plan name, unmapped.
  Literal,
  /// Nothing matched; the configured default was used.
  Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
  pub name: String,
  pub source: PlanSource,
}

impl ResolvedPlan {
  /// Whether the payload itself identified the plan.
  pub fn from_payload(&self) -> bool {
    self.source != PlanSource::Default
  }
}

/// Offer/product identifiers to plan names. Keys are matched ignoring case.
#[derive(Debug, Clone, Default)]
pub struct PlanMap {
  configured: HashMap<String, String>,
  default: Option<String>,
}

fn key(raw: &str) -> String {
  raw.trim().to_lowercase()
}

impl PlanMap {
  pub fn new(
    entries: impl IntoIterator<Item = (String, String)>,
    default: Option<String>,
  ) -> Self {
    let configured = entries
      .into_iter()
      .map(|(k, v)| (key(&k), v.trim().to_string()))
      .filter(|(k, v)| !k.is_empty() && !v.is_empty())
      .collect();
    let default = default.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    Self { configured, default }
  }

  /// Parses a JSON object such as `{"abc123": "VIP", "5060349": "Lite"}`.
  /// Blank input yields an empty map.
  pub fn from_json(raw: &str, default: Option<String>) -> json::Result<Self> {
    if raw.trim().is_empty() {
      return Ok(Self::new([], default));
    }

    let object: HashMap<String, Value> = json::from_str(raw)?;
    let entries = object
      .into_iter()
      .filter_map(|(k, v)| text(Some(&v)).map(|v| (k, v)));
    Ok(Self::new(entries, default))
  }

  pub fn lookup(&self, raw: &str) -> Option<&str> {
    let key = key(raw);
    if key.is_empty() {
      return None;
    }
    self.configured.get(&key).map(String::as_str).or_else(|| {
      BUILTIN.iter().find(|(k, _)| *k == key).map(|(_, plan)| *plan)
    })
  }

  /// Offer code, offer id, product id, product name, then the plan name
  /// (mapped, else taken literally), then the default.
  pub fn resolve(&self, data: &SubscriberData) -> Option<ResolvedPlan> {
    let keys = [&data.offer_code, &data.offer_id, &data.product_id, &data.product_name];
    let mapped = keys
      .into_iter()
      .flatten()
      .chain(&data.plan_name)
      .find_map(|k| self.lookup(k));

    if let Some(name) = mapped {
      return Some(ResolvedPlan { name: name.to_string(), source: PlanSource::Mapped });
    }

    if let Some(name) = &data.plan_name {
      return Some(ResolvedPlan { name: name.clone(), source: PlanSource::Literal });
    }

    self
      .default
      .clone()
      .map(|name| ResolvedPlan { name, source: PlanSource::Default })
  }
}
