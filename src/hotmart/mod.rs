//! Hotmart webhook vocabulary: payload extraction, event classification,
//! plan resolution and request authentication.

mod event;
mod payload;
mod plan;

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub use event::{Action, Decision, Source, classify, decide, event_type, status};
pub use payload::{Shape, SubscriberData};
pub use plan::{PlanMap, PlanSource, ResolvedPlan};

pub const HMAC_HEADER: &str = "x-hotmart-hmac-sha256";
pub const HOTTOK_HEADER: &str = "x-hotmart-hottok";

/// Credential carried by an incoming webhook request.
#[derive(Debug, Clone, Copy)]
pub enum Credential<'a> {
  /// Shared token compared directly, takes precedence when present.
  Hottok(&'a str),
  /// Base64 HMAC-SHA256 of the raw body.
  Hmac(&'a str),
  Missing,
}

impl<'a> Credential<'a> {
  pub fn from_headers(hottok: Option<&'a str>, hmac: Option<&'a str>) -> Self {
    match (hottok.map(str::trim), hmac.map(str::trim)) {
      (Some(token), _) if !token.is_empty() => Self::Hottok(token),
      (_, Some(sig)) if !sig.is_empty() => Self::Hmac(sig),
      _ => Self::Missing,
    }
  }

  /// An empty secret rejects every request.
  pub fn verify(&self, body: &[u8], secret: &str) -> bool {
    if secret.is_empty() {
      return false;
    }
    match *self {
      Self::Hottok(token) => verify_hottok(token, secret),
      Self::Hmac(signature) => verify_hmac(body, signature, secret),
      Self::Missing => false,
    }
  }
}

pub fn verify_hottok(token: &str, secret: &str) -> bool {
  !secret.is_empty() && bool::from(token.as_bytes().ct_eq(secret.as_bytes()))
}

pub fn verify_hmac(body: &[u8], signature: &str, secret: &str) -> bool {
  if secret.is_empty() {
    return false;
  }
  let Ok(signature) = STANDARD.decode(signature.trim()) else {
    return false;
  };
  let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
    return false;
  };
  mac.update(body);
  mac.verify_slice(&signature).is_ok()
}

/// Trimmed, non-empty textual form of a scalar JSON value.
fn text(value: Option<&Value>) -> Option<String> {
  let text = match value? {
    Value::String(s) => s.trim().to_string(),
    Value::Number(n) => n.to_string(),
    _ => return None,
  };
  (!text.is_empty()).then_some(text)
}

/// First non-empty scalar found at `pointers`, in order.
fn first_at(root: &Value, pointers: &[&str]) -> Option<String> {
  pointers.iter().find_map(|pointer| text(root.pointer(pointer)))
}
