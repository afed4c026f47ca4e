use json::Value;
use serde::Serialize;

use super::{first_at, text};
use crate::phone;

/// Layout of the received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
  /// Newer schema, purchase details nested under `data`.
  Enveloped,
  /// Older schema, fields at the top level.
  Flat,
}

/// Normalised view over a webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberData {
  /// Lower-cased, empty when the payload carries none.
  pub email: String,
  pub name: String,
  pub phone: String,
  pub offer_code: Option<String>,
  pub offer_id: Option<String>,
  pub product_id: Option<String>,
  pub product_name: Option<String>,
  pub plan_name: Option<String>,
}

const NAME_POINTERS: &[&str] = &["/name", "/full_name"];

const OFFER_CODE_POINTERS: &[&str] = &[
  "/offer/code",
  "/offer/offer_code",
  "/offer/offer_code_hash",
  "/purchase/offer_code",
];

const OFFER_ID_POINTERS: &[&str] = &["/offer/id", "/offer/offer_id"];

const PRODUCT_ID_POINTERS: &[&str] =
  &["/product/id", "/product/product_id", "/purchase/product_id"];

const PRODUCT_NAME_POINTERS: &[&str] = &["/product/name", "/purchase/product_name"];

const PLAN_POINTERS: &[&str] = &[
  "/plan",
  "/plan_name",
  "/offer/name",
  "/product/name",
  "/purchase/plan/name",
  "/purchase/plan_name",
  "/purchase/plan/plan_name",
  "/subscription/plan/name",
  "/subscription/plan_name",
  "/subscription/plan/plan_name",
];

const CHECKOUT_FIELDS: &[&str] = &[
  "checkout_phone",
  "checkout_phone_code",
  "checkout_phone_number",
  "checkout_phone_country_code",
  "checkout_phone_area_code",
];

impl Shape {
  pub fn of(payload: &Value) -> Self {
    match payload.get("data") {
      Some(data) if data.is_object() => Shape::Enveloped,
      _ => Shape::Flat,
    }
  }
}

impl SubscriberData {
  pub fn extract(payload: &Value) -> Self {
    let data = match Shape::of(payload) {
      Shape::Enveloped => &payload["data"],
      Shape::Flat => payload,
    };

    let subscriber = &data["subscriber"];
    let buyer = match &data["buyer"] {
      Value::Null => &data["customer"],
      buyer => buyer,
    };
    let purchase = &data["purchase"];
    // the subscriber block wins when it identifies the person
    let contact =
      if text(subscriber.get("email")).is_some() { subscriber } else { buyer };

    let email = [contact, buyer, subscriber, data, payload]
      .into_iter()
      .find_map(|v| text(v.get("email")))
      .unwrap_or_default()
      .to_lowercase();

    let name = first_at(contact, NAME_POINTERS)
      .or_else(|| text(buyer.get("name")))
      .or_else(|| text(subscriber.get("name")))
      .or_else(|| first_at(data, &["/full_name", "/name", "/product/name"]))
      .unwrap_or_default();

    let phone = [contact, buyer, subscriber, &purchase["customer"], purchase, data]
      .into_iter()
      .find_map(phone_of)
      .unwrap_or_default();

    Self {
      email,
      name,
      phone,
      offer_code: first_at(data, OFFER_CODE_POINTERS),
      offer_id: first_at(data, OFFER_ID_POINTERS),
      product_id: first_at(data, PRODUCT_ID_POINTERS),
      product_name: first_at(data, PRODUCT_NAME_POINTERS),
      plan_name: first_at(data, PLAN_POINTERS),
    }
  }

  /// Name to store, falling back to the email.
  pub fn display_name(&self) -> &str {
    if self.name.is_empty() { &self.email } else { &self.name }
  }
}

fn digits(source: &Value, key: &str) -> String {
  text(source.get(key)).map(|s| phone::normalize(&s)).unwrap_or_default()
}

fn raw_string(source: &Value, key: &str) -> Option<String> {
  source
    .get(key)
    .and_then(Value::as_str)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
}

/// Checkout fields split the number into country, area and local parts and
/// sometimes repeat the area code inside the local part.
fn checkout_phone(source: &Value) -> Option<String> {
  let country = digits(source, "checkout_phone_country_code");
  let area = digits(source, "checkout_phone_area_code");
  let code = match digits(source, "checkout_phone_code") {
    code if code.is_empty() => country.clone(),
    code => code,
  };
  let number = match digits(source, "checkout_phone") {
    number if number.is_empty() => digits(source, "checkout_phone_number"),
    number => number,
  };

  if !number.is_empty() {
    let has_area = number.starts_with(&area)
      || (!country.is_empty() && number.starts_with(&country));
    let combined =
      if area.is_empty() || has_area { number } else { format!("{area}{number}") };

    if code.is_empty() || combined.starts_with(&code) {
      return Some(combined);
    }
    return Some(format!("{code}{combined}"));
  }

  let prefix = if country.is_empty() { code } else { country };
  let combined = [prefix, area, number].concat();
  (!combined.is_empty()).then_some(combined)
}

fn phone_of(source: &Value) -> Option<String> {
  if !source.is_object() {
    return None;
  }

  if CHECKOUT_FIELDS.iter().any(|key| text(source.get(key)).is_some())
    && let Some(phone) = checkout_phone(source)
  {
    return Some(phone);
  }

  match source.get("phone") {
    Some(Value::String(phone)) if !phone.trim().is_empty() => {
      return Some(phone.trim().to_string());
    }
    Some(phone @ Value::Object(_)) => {
      if let Some(full) = raw_string(phone, "full_number") {
        return Some(full);
      }
      let joined: String = ["country_code", "area_code", "number", "phone_number"]
        .into_iter()
        .map(|key| digits(phone, key))
        .collect();
      if !joined.is_empty() {
        return Some(joined);
      }
    }
    _ => {}
  }

  raw_string(source, "phone_number")
    .or_else(|| raw_string(source, "cellphone"))
    .or_else(|| raw_string(source, "mobile"))
    .or_else(|| source.get("contact").and_then(|c| raw_string(c, "phone")))
}

#[cfg(test)]
mod tests {
  use json::json;

  use super::*;

  #[test]
  fn test_enveloped_purchase() {
    let payload = json!({
      "event": "PURCHASE_APPROVED",
      "data": {
        "buyer": {
          "email": " A@B.com ",
          "name": "Ana Souza",
          "checkout_phone": "992998920",
          "checkout_phone_area_code": "67",
          "checkout_phone_country_code": "55"
        },
        "product": {"id": 5060609, "name": "Close Friends"},
        "offer": {"code": "abc123"},
        "purchase": {"status": "APPROVED"}
      }
    });

    let data = SubscriberData::extract(&payload);
    assert_eq!(Shape::of(&payload), Shape::Enveloped);
    assert_eq!(data.email, "a@b.com");
    assert_eq!(data.name, "Ana Souza");
    assert_eq!(data.phone, "5567992998920");
    assert_eq!(data.offer_code.as_deref(), Some("abc123"));
    assert_eq!(data.product_id.as_deref(), Some("5060609"));
    assert_eq!(data.product_name.as_deref(), Some("Close Friends"));
    assert_eq!(data.plan_name.as_deref(), Some("Close Friends"));
  }

  #[test]
  fn test_checkout_number_already_has_area() {
    let source = json!({"checkout_phone_code": "67", "checkout_phone": "67992998920"});
    assert_eq!(phone_of(&source).as_deref(), Some("67992998920"));

    let source = json!({"checkout_phone_code": "67", "checkout_phone": "992998920"});
    assert_eq!(phone_of(&source).as_deref(), Some("67992998920"));

    let source = json!({"checkout_phone_country_code": "55", "checkout_phone_area_code": "11"});
    assert_eq!(phone_of(&source).as_deref(), Some("5511"));
  }

  #[test]
  fn test_phone_fallbacks() {
    assert_eq!(
      phone_of(&json!({"phone": "+55 11 91234-5678"})).as_deref(),
      Some("+55 11 91234-5678")
    );
    let split = json!({
      "phone": {"country_code": "+55", "area_code": "11", "number": "91234-5678"}
    });
    assert_eq!(phone_of(&split).as_deref(), Some("5511912345678"));
    assert_eq!(phone_of(&json!({"phone": {"full_number": "11 9999"}})).as_deref(), Some("11 9999"));
    assert_eq!(phone_of(&json!({"cellphone": "123"})).as_deref(), Some("123"));
    assert_eq!(phone_of(&json!({"contact": {"phone": "456"}})).as_deref(), Some("456"));
    assert_eq!(phone_of(&json!({"phone": ""})), None);
    assert_eq!(phone_of(&json!("11912345678")), None);
  }

  #[test]
  fn test_flat_subscriber_wins() {
    let payload = json!({
      "event": "subscription.canceled",
      "subscriber": {"email": "sub@x.com", "name": "Sub", "phone_number": "11988887777"},
      "buyer": {"email": "buyer@x.com", "name": "Buyer", "phone": "11911112222"},
      "subscription": {"plan": {"name": "VIP"}}
    });

    let data = SubscriberData::extract(&payload);
    assert_eq!(Shape::of(&payload), Shape::Flat);
    assert_eq!(data.email, "sub@x.com");
    assert_eq!(data.name, "Sub");
    assert_eq!(data.phone, "11988887777");
    assert_eq!(data.plan_name.as_deref(), Some("VIP"));
    assert_eq!(data.offer_code, None);
  }

  #[test]
  fn test_customer_alias_and_missing_email() {
    let payload = json!({"data": {"customer": {"name": "Joe"}, "plan_name": "Lite"}});
    let data = SubscriberData::extract(&payload);
    assert_eq!(data.email, "");
    assert_eq!(data.display_name(), "Joe");
    assert_eq!(data.plan_name.as_deref(), Some("Lite"));

    let data = SubscriberData::extract(&json!({"email": "X@Y.z"}));
    assert_eq!(data.display_name(), "x@y.z");
  }
}
