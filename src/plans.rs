//! Set of plan names held by one subscriber.
//!
//! Stored as a comma-joined string; parsing accepts `,`, `;` and newlines.
//! Membership is case-sensitive so configured plan names keep their casing,
//! the `_ci` helpers are for lookups against user or vendor input.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSet(BTreeSet<String>);

impl PlanSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_raw(raw: &str) -> Self {
    let mut set = Self::new();
    set.extend_raw(raw);
    set
  }

  fn extend_raw(&mut self, raw: &str) {
    for part in raw.split([',', ';', '\n', '\r']) {
      let part = part.trim();
      if !part.is_empty() {
        self.0.insert(part.to_string());
      }
    }
  }

  pub fn merge(&self, other: &PlanSet) -> PlanSet {
    PlanSet(self.0.union(&other.0).cloned().collect())
  }

  /// Members of `old` absent from `new`.
  pub fn diff_removed(old: &PlanSet, new: &PlanSet) -> PlanSet {
    PlanSet(old.0.difference(&new.0).cloned().collect())
  }

  pub fn format(&self) -> String {
    self.0.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.0.iter().map(String::as_str)
  }

  pub fn contains(&self, plan: &str) -> bool {
    self.0.contains(plan)
  }

  pub fn contains_ci(&self, plan: &str) -> bool {
    let plan = plan.trim();
    self.0.iter().any(|p| p.eq_ignore_ascii_case(plan))
  }

  /// Removes every member equal to `plan` ignoring case, returning them.
  pub fn remove_ci(&mut self, plan: &str) -> PlanSet {
    let plan = plan.trim();
    let (removed, kept) = std::mem::take(&mut self.0)
      .into_iter()
      .partition(|p| p.eq_ignore_ascii_case(plan));
    self.0 = kept;
    PlanSet(removed)
  }
}

impl<S: AsRef<str>> FromIterator<S> for PlanSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    let mut set = Self::new();
    for raw in iter {
      set.extend_raw(raw.as_ref());
    }
    set
  }
}

impl FromStr for PlanSet {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::from_raw(s))
  }
}

impl fmt::Display for PlanSet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.format())
  }
}

impl Serialize for PlanSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(self.iter())
  }
}

/// Accepts either a delimited string or a list of strings.
impl<'de> Deserialize<'de> for PlanSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      One(String),
      Many(Vec<String>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
      Some(Raw::One(raw)) => PlanSet::from_raw(&raw),
      Some(Raw::Many(list)) => list.into_iter().collect(),
      None => PlanSet::new(),
    })
  }
}
