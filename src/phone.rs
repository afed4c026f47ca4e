//! Tolerant phone comparison for identity checks.
//!
//! Payment-platform and user-typed numbers disagree on whether the country
//! code, area code or a trunk `0` prefix is present, so two numbers match when
//! one is a suffix of the other once both are reduced to digits.

/// Shortest digit run that is accepted as an identifying phone number.
pub const MIN_MATCH_LEN: usize = 6;

pub fn normalize(raw: &str) -> String {
  raw.chars().filter(char::is_ascii_digit).collect()
}

fn strip_leading_zeros(digits: &str) -> &str {
  let trimmed = digits.trim_start_matches('0');
  if trimmed.is_empty() { digits } else { trimmed }
}

pub fn matches(a: &str, b: &str) -> bool {
  matches_with(a, b, MIN_MATCH_LEN)
}

pub fn matches_with(a: &str, b: &str, min_len: usize) -> bool {
  let a = normalize(a);
  let b = normalize(b);

  if a.len() < min_len || b.len() < min_len {
    return false;
  }

  if a == b {
    return true;
  }

  let (a, b) = (strip_leading_zeros(&a), strip_leading_zeros(&b));
  if a == b {
    return true;
  }

  if a.len() < min_len || b.len() < min_len {
    return false;
  }

  a.ends_with(b) || b.ends_with(a)
}
