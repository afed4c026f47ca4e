use std::{sync::Arc, time::Instant};

use axum::{
  Json,
  body::Bytes,
  extract::{FromRequestParts, Path, Query, State, rejection::JsonRejection},
  http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
};
use json::{Value, json};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
  hotmart::{Credential, HMAC_HEADER, HOTTOK_HEADER},
  prelude::*,
  state::AppState,
  sv::{
    access::{ImportRow, WebhookOutcome},
    verification::VerifyRequest,
  },
};

pub type Reply = (StatusCode, Json<Value>);

fn reply(status: StatusCode, body: Value) -> Reply {
  (status, Json(body))
}

fn failure(status: StatusCode, msg: impl Into<String>) -> Reply {
  reply(status, json!({ "success": false, "msg": msg.into() }))
}

fn error_reply(err: &Error) -> Reply {
  let status = match err {
    Error::InvalidArgs(_) => StatusCode::BAD_REQUEST,
    Error::TokenInvalid => StatusCode::UNAUTHORIZED,
    Error::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
    Error::VerificationMismatch
    | Error::SubscriberNotFound
    | Error::ChannelNotFound => StatusCode::NOT_FOUND,
    Error::NotAuthorized | Error::SubscriberInactive(_) => StatusCode::FORBIDDEN,
    Error::Messenger(_) => StatusCode::BAD_GATEWAY,
    Error::Db(_) | Error::Json(_) | Error::Internal(_) => {
      error!("request failed: {err}");
      StatusCode::INTERNAL_SERVER_ERROR
    }
  };
  failure(status, err.user_message())
}

pub async fn health() -> Reply {
  reply(StatusCode::OK, json!({ "status": "ok" }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
  headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn webhook(
  State(app): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Reply {
  let credential = Credential::from_headers(
    header(&headers, HOTTOK_HEADER),
    header(&headers, HMAC_HEADER),
  );
  if !credential.verify(&body, &app.config.webhook_secret) {
    warn!("webhook rejected: missing or invalid signature");
    return failure(StatusCode::UNAUTHORIZED, "invalid signature");
  }

  let payload: Value = match json::from_slice(&body) {
    Ok(payload) => payload,
    Err(err) => {
      warn!("webhook rejected: malformed json: {err}");
      return failure(StatusCode::BAD_REQUEST, "malformed json");
    }
  };

  match app.sv().access.apply_webhook(&payload).await {
    Ok(WebhookOutcome::Ignored { event, status }) => reply(
      StatusCode::ACCEPTED,
      json!({ "success": true, "ignored": true, "event": event, "status": status }),
    ),
    Ok(WebhookOutcome::MissingEmail) => {
      failure(StatusCode::BAD_REQUEST, "email not found in payload")
    }
    Ok(WebhookOutcome::NoPlan) => {
      failure(StatusCode::UNPROCESSABLE_ENTITY, "could not resolve a plan")
    }
    Ok(WebhookOutcome::Activated { subscriber_id, plan }) => reply(
      StatusCode::OK,
      json!({ "action": "activated", "subscriberId": subscriber_id, "plan": plan }),
    ),
    Ok(WebhookOutcome::Deactivated { subscriber_id, plan }) => reply(
      StatusCode::OK,
      json!({ "action": "deactivated", "subscriberId": subscriber_id, "plan": plan }),
    ),
    Err(err) => error_reply(&err),
  }
}

#[derive(Deserialize)]
pub struct TokenQuery {
  token: Option<String>,
}

pub async fn check_token(
  State(app): State<Arc<AppState>>,
  Query(query): Query<TokenQuery>,
) -> Reply {
  let Some(token) = query.token.filter(|t| !t.trim().is_empty()) else {
    return failure(StatusCode::BAD_REQUEST, "token is required");
  };

  match app.verification().check(token.trim()) {
    Some(left) => reply(
      StatusCode::OK,
      json!({ "valid": true, "expiresIn": left.as_secs() }),
    ),
    None => reply(StatusCode::UNAUTHORIZED, json!({ "valid": false })),
  }
}

pub async fn verify(
  State(app): State<Arc<AppState>>,
  req: std::result::Result<Json<VerifyRequest>, JsonRejection>,
) -> Reply {
  let Ok(Json(req)) = req else {
    return failure(StatusCode::BAD_REQUEST, "token, email and phone are required");
  };

  match app.verification().verify(req).await {
    Ok(verified) => reply(
      StatusCode::OK,
      json!({
        "success": true,
        "name": verified.name,
        "plans": verified.plans,
        "channels": verified.channels,
      }),
    ),
    Err(err) => error_reply(&err),
  }
}

/// Bearer `ADMIN_API_TOKEN`; admin routes are closed when it is unset.
pub struct Admin;

impl FromRequestParts<Arc<AppState>> for Admin {
  type Rejection = Reply;

  async fn from_request_parts(
    parts: &mut Parts,
    app: &Arc<AppState>,
  ) -> std::result::Result<Self, Self::Rejection> {
    let Some(expected) = app.config.admin_api_token.as_deref() else {
      return Err(failure(StatusCode::NOT_FOUND, "admin api disabled"));
    };

    let provided = header(&parts.headers, AUTHORIZATION.as_str())
      .and_then(|v| v.strip_prefix("Bearer "))
      .unwrap_or_default();

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
      Ok(Admin)
    } else {
      Err(failure(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
  }
}

pub async fn import(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Json(rows): Json<Vec<ImportRow>>,
) -> Reply {
  let summary = match app.sv().access.import(rows).await {
    Ok(summary) => summary,
    Err(err) => return error_reply(&err),
  };

  let to_remove = summary.to_remove.clone();
  let job = app.jobs.start("import-removal", to_remove.len());

  if !to_remove.is_empty() {
    let app = app.clone();
    tokio::spawn(async move {
      app.sv().access.remove_batch(&app.jobs, job, to_remove).await;
    });
  }

  reply(
    StatusCode::OK,
    json!({
      "success": true,
      "summary": summary,
      "removing": summary.to_remove.len(),
      "job": job,
    }),
  )
}

pub async fn job(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Reply {
  match app.jobs.get(id) {
    Some(report) => reply(StatusCode::OK, json!(report)),
    None => failure(StatusCode::NOT_FOUND, "job not found"),
  }
}

pub async fn sync(_: Admin, State(app): State<Arc<AppState>>) -> Reply {
  let started = Instant::now();
  match app.sv().access.sync_inactive().await {
    Ok(report) => reply(
      StatusCode::OK,
      json!({ "success": true, "report": report, "tookMs": started.elapsed().as_millis() as u64 }),
    ),
    Err(err) => error_reply(&err),
  }
}

pub async fn stats(_: Admin, State(app): State<Arc<AppState>>) -> Reply {
  match app.sv().subscriber.stats().await {
    Ok(stats) => reply(StatusCode::OK, json!(stats)),
    Err(err) => error_reply(&err),
  }
}

#[derive(Deserialize)]
pub struct LogsQuery {
  limit: Option<u64>,
}

pub async fn logs(
  _: Admin,
  State(app): State<Arc<AppState>>,
  Query(query): Query<LogsQuery>,
) -> Reply {
  let limit = query.limit.unwrap_or(50).clamp(1, 500);
  match app.sv().auth.logs(limit).await {
    Ok(logs) => reply(StatusCode::OK, json!(logs)),
    Err(err) => error_reply(&err),
  }
}

#[cfg(test)]
mod tests {
  use axum::{body::Body, http::Request};
  use base64::{Engine, engine::general_purpose::STANDARD};
  use hmac::{Hmac, Mac};
  use sha2::Sha256;
  use teloxide::Bot;
  use tower::ServiceExt;

  use super::*;
  use crate::{
    config::Config,
    plugins::server::router,
    sv::test_utils::{fake, test_db},
  };

  const SECRET: &str = "s3cret";

  async fn app() -> Arc<AppState> {
    let config = Config {
      webhook_secret: SECRET.into(),
      admin_api_token: Some("admin".into()),
      ..fake::config()
    };
    Arc::new(AppState::new(test_db::setup().await, Bot::new("0:test"), config))
  }

  fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
  }

  async fn send(app: &Arc<AppState>, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router(app.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, json::from_slice(&bytes).unwrap_or(Value::Null))
  }

  fn webhook_req(body: &str, signature: Option<String>) -> Request<Body> {
    let mut req = Request::post("/webhook").header("content-type", "application/json");
    if let Some(signature) = signature {
      req = req.header(HMAC_HEADER, signature);
    }
    req.body(Body::from(body.to_string())).unwrap()
  }

  #[tokio::test]
  async fn test_webhook_status_codes() {
    let app = app().await;

    let body = r#"{"event":"purchase.approved","data":{
      "buyer":{"email":"a@b.com"},"product":{"name":"VIP"}}}"#;
    let (status, _) = send(&app, webhook_req(body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, webhook_req(body, Some(sign("tampered")))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, webhook_req("{not json", Some(sign("{not json")))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ignored = r#"{"event":"club.module_completed"}"#;
    let (status, _) = send(&app, webhook_req(ignored, Some(sign(ignored)))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let no_email = r#"{"event":"purchase.approved","data":{"product":{"name":"VIP"}}}"#;
    let (status, _) = send(&app, webhook_req(no_email, Some(sign(no_email)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_plan = r#"{"event":"purchase.approved","data":{"buyer":{"email":"a@b.com"}}}"#;
    let (status, _) = send(&app, webhook_req(no_plan, Some(sign(no_plan)))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app, webhook_req(body, Some(sign(body)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], "activated");
    assert_eq!(body["plan"], "VIP");
  }

  #[tokio::test]
  async fn test_hottok_header() {
    let app = app().await;
    let body = r#"{"event":"purchase.approved","email":"a@b.com","plan":"Gold"}"#;

    let req = Request::post("/webhook")
      .header(HOTTOK_HEADER, SECRET)
      .body(Body::from(body))
      .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "Gold");
  }

  #[tokio::test]
  async fn test_verification_endpoints() {
    let app = app().await;

    let req = Request::get("/api/check-token").body(Body::empty()).unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = app.tokens.issue(5);
    let uri = format!("/api/check-token?token={token}");
    let (status, body) = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let verify = |token: &str, email: &str| {
      let body = json!({"token": token, "email": email, "phone": "11912345678"});
      Request::post("/api/verify")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
    };

    let (status, _) = send(&app, verify(&token, "bad")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, verify("nope", "a@b.com")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, verify(&token, "a@b.com")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], Error::VerificationMismatch.user_message());
  }

  #[tokio::test]
  async fn test_admin_routes_require_token() {
    let app = app().await;

    let req = Request::get("/api/admin/stats").body(Body::empty()).unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::get("/api/admin/stats")
      .header(AUTHORIZATION, "Bearer admin")
      .body(Body::empty())
      .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_subscribers"], 0);

    let req = Request::post("/api/admin/import")
      .header(AUTHORIZATION, "Bearer admin")
      .header("content-type", "application/json")
      .body(Body::from(r#"[{"name":"A","email":"a@b.com","phone":"11912345678","plan":"VIP"}]"#))
      .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["created"], 1);

    let job = body["job"].as_str().unwrap();
    let req = Request::get(format!("/api/admin/jobs/{job}"))
      .header(AUTHORIZATION, "Bearer admin")
      .body(Body::empty())
      .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["finished"], true);
  }
}
