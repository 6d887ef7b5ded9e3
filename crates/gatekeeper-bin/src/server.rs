//! HTTP surface: Telegram webhook, cancellation notifications, link lookup.

use crate::app::AppState;
use access_reconciler::codec::{fits_start_payload, MAX_START_PAYLOAD_LEN};
use access_reconciler::{encode_email, registration_link, CancellationOutcome, EventReport};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use telegram_messaging::decode_update;
use tracing::{debug, info_span, warn, Instrument};

/// Header Telegram echoes the webhook secret in.
pub const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";
/// Header carrying the shared secret on operator and billing routes.
pub const GATEKEEPER_SECRET_HEADER: &str = "x-gatekeeper-secret";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/telegram", post(telegram_update))
        .route("/cancel", post(cancel))
        .route("/link", get(link))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn constant_time_eq(left: &str, right: &str) -> bool {
    let left_bytes = left.as_bytes();
    let right_bytes = right.as_bytes();
    if left_bytes.len() != right_bytes.len() {
        return false;
    }

    let mut diff = 0_u8;
    for (a, b) in left_bytes.iter().zip(right_bytes.iter()) {
        diff |= *a ^ *b;
    }
    diff == 0
}

/// No configured secret means the route is open.
fn secret_matches(expected: Option<&str>, headers: &HeaderMap, header: &str) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(|provided| constant_time_eq(provided, expected))
        .unwrap_or(false)
}

async fn telegram_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let request_id = request_id_from_headers(&headers);

    if !secret_matches(
        state.webhook_secret.as_deref(),
        &headers,
        TELEGRAM_SECRET_HEADER,
    ) {
        warn!(request_id = %request_id, "Rejected webhook call with a bad secret");
        return StatusCode::UNAUTHORIZED;
    }

    let event = match decode_update(&body) {
        Ok(event) => event,
        Err(err) => {
            // Acknowledge anyway so Telegram does not redeliver it forever.
            warn!(request_id = %request_id, body_len = body.len(), error = %err, "Undecodable update");
            return StatusCode::OK;
        }
    };

    let report = state
        .reconciler
        .handle_event(event)
        .instrument(info_span!("telegram_update", request_id = %request_id))
        .await;
    debug!(request_id = %request_id, report = ?report, "Update handled");

    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    email: String,
}

async fn cancel(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = request_id_from_headers(&headers);

    if !secret_matches(
        state.cancel_secret.as_deref(),
        &headers,
        GATEKEEPER_SECRET_HEADER,
    ) {
        warn!(request_id = %request_id, "Rejected cancellation with a bad secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let request: CancelRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "Malformed cancellation body");
            return invalid_request("body must be {\"email\": \"...\"}");
        }
    };
    let email = request.email.trim();
    if email.is_empty() {
        return invalid_request("email is empty");
    }

    let report = state
        .reconciler
        .handle_cancellation(email)
        .instrument(info_span!("cancellation", request_id = %request_id))
        .await;

    let outcome = match report {
        EventReport::Cancellation(report) => match report.outcome {
            CancellationOutcome::NoActiveRecord => "no_active_record",
            CancellationOutcome::Deactivated { .. } => "deactivated",
        },
        EventReport::Failed(_) => "failed",
        _ => "ignored",
    };

    (
        StatusCode::OK,
        Json(json!({ "requestId": request_id, "outcome": outcome })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct LinkQuery {
    #[serde(default)]
    email: String,
}

async fn link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LinkQuery>,
) -> Response {
    if !secret_matches(
        state.cancel_secret.as_deref(),
        &headers,
        GATEKEEPER_SECRET_HEADER,
    ) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let email = query.email.trim();
    if email.is_empty() {
        return invalid_request("email query parameter is required");
    }

    let Some(username) = state.bot_username.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "bot username unknown" })),
        )
            .into_response();
    };

    let token = encode_email(email);
    let fits = fits_start_payload(&token);
    if !fits {
        warn!(
            email = %email,
            max_len = MAX_START_PAYLOAD_LEN,
            "Encoded email exceeds the deep-link payload limit; Telegram may drop it"
        );
    }

    Json(json!({
        "email": email,
        "token": token,
        "link": registration_link(username, email),
        "fitsStartPayload": fits,
    }))
    .into_response()
}

fn invalid_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_request", "message": message })),
    )
        .into_response()
}
