//! Registry client against a local stand-in for the Sheets and OAuth endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use access_reconciler::{CellRef, RegistryClient, RegistryError, RowRef, SubscriberRecord};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use gatekeeper_config_and_utils::SheetLayout;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{json, Value};
use sheets_registry::{
    AccessTokenSource, ServiceAccountKey, ServiceAccountTokens, SheetsRegistry, SPREADSHEETS_SCOPE,
};

const PRIVATE_KEY: &str = include_str!("fixtures/test-service-account.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/test-service-account.pub.pem");
const REVOKED: &str = "revoked@project.iam.gserviceaccount.com";

#[derive(Default)]
struct Upstream {
    exchanges: Mutex<usize>,
    writes: Mutex<Vec<(String, HashMap<String, String>, Value)>>,
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    assertion: String,
}

#[derive(Deserialize)]
struct Claims {
    iss: String,
    scope: String,
}

async fn token(
    State(upstream): State<Arc<Upstream>>,
    Form(form): Form<TokenForm>,
) -> (StatusCode, Json<Value>) {
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;

    let claims = match decode::<Claims>(&form.assertion, &key, &validation) {
        Ok(data) => data.claims,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))),
    };
    if form.grant_type != "urn:ietf:params:oauth:grant-type:jwt-bearer"
        || claims.scope != SPREADSHEETS_SCOPE
        || claims.iss == REVOKED
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})));
    }

    let mut exchanges = upstream.exchanges.lock().unwrap();
    *exchanges += 1;
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("tok-{}", *exchanges),
            "expires_in": 3600,
            "token_type": "Bearer",
        })),
    )
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

async fn read_values(
    Path((spreadsheet, range)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let token = bearer(&headers);
    if !token.starts_with("tok-") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": 401}})));
    }

    match spreadsheet.as_str() {
        "forbidden" => (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "The caller does not have permission"}})),
        ),
        "stale" if token == "tok-1" => {
            (StatusCode::UNAUTHORIZED, Json(json!({"error": {"code": 401}})))
        }
        "empty" => (StatusCode::OK, Json(json!({"range": range, "majorDimension": "ROWS"}))),
        "blank-emails" => (
            StatusCode::OK,
            Json(json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [["", "TRUE", "42"], ["", "FALSE"]],
            })),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [
                    ["a@x.com", "TRUE"],
                    ["b@x.com", "TRUE", "42"],
                    ["", "TRUE", "5"],
                    ["c@x.com", "FALSE", "7"],
                ],
            })),
        ),
    }
}

async fn write_value(
    State(upstream): State<Arc<Upstream>>,
    Path((_spreadsheet, range)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    upstream
        .writes
        .lock()
        .unwrap()
        .push((range.clone(), query, body));
    Json(json!({"updatedRange": range, "updatedCells": 1}))
}

async fn serve() -> (SocketAddr, Arc<Upstream>) {
    let upstream = Arc::new(Upstream::default());
    let app = Router::new()
        .route("/token", post(token))
        .route(
            "/v4/spreadsheets/:spreadsheet/values/:range",
            get(read_values).put(write_value),
        )
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, upstream)
}

fn tokens(addr: SocketAddr, client_email: &str) -> Arc<ServiceAccountTokens> {
    let key = ServiceAccountKey::from_json(
        &json!({
            "type": "service_account",
            "client_email": client_email,
            "private_key": PRIVATE_KEY,
            "token_uri": format!("http://{addr}/token"),
        })
        .to_string(),
    )
    .unwrap();
    Arc::new(ServiceAccountTokens::new(key, reqwest::Client::new()).unwrap())
}

fn registry(addr: SocketAddr, spreadsheet: &str, tokens: Arc<ServiceAccountTokens>) -> SheetsRegistry {
    SheetsRegistry::new(
        reqwest::Client::new(),
        spreadsheet,
        &SheetLayout::default(),
        tokens,
    )
    .unwrap()
    .with_base_url(format!("http://{addr}/v4/spreadsheets"))
}

#[tokio::test]
async fn fetch_rows_reads_the_sheet_with_a_cached_token() {
    let (addr, upstream) = serve().await;
    let registry = registry(addr, "sheet-1", tokens(addr, "svc@project.iam.gserviceaccount.com"));

    let first = registry.fetch_rows().await.unwrap();
    let second = registry.fetch_rows().await.unwrap();

    assert_eq!(
        first,
        vec![
            SubscriberRecord::new(2, "a@x.com", true, None),
            SubscriberRecord::new(3, "b@x.com", true, Some(42)),
            SubscriberRecord::new(5, "c@x.com", false, Some(7)),
        ]
    );
    assert_eq!(first, second);
    assert_eq!(*upstream.exchanges.lock().unwrap(), 1);
}

#[tokio::test]
async fn concurrent_first_calls_share_one_exchange() {
    let (addr, upstream) = serve().await;
    let tokens = tokens(addr, "svc@project.iam.gserviceaccount.com");

    let calls = (0..8).map(|_| {
        let tokens = tokens.clone();
        tokio::spawn(async move { tokens.access_token().await.unwrap() })
    });
    let mut issued = Vec::new();
    for call in calls {
        issued.push(call.await.unwrap());
    }

    assert!(issued.iter().all(|token| token == "tok-1"));
    assert_eq!(*upstream.exchanges.lock().unwrap(), 1);
}

#[tokio::test]
async fn write_cell_puts_a_raw_value() {
    let (addr, upstream) = serve().await;
    let registry = registry(addr, "sheet-1", tokens(addr, "svc@project.iam.gserviceaccount.com"));

    registry
        .write_cell(CellRef::linked_identity(RowRef(2)), "42")
        .await
        .unwrap();

    let writes = upstream.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let (range, query, body) = &writes[0];
    assert_eq!(range, "Subscribers!C2");
    assert_eq!(query.get("valueInputOption").map(String::as_str), Some("RAW"));
    assert_eq!(body["values"], json!([["42"]]));
}

#[tokio::test]
async fn missing_values_are_an_empty_range() {
    let (addr, _upstream) = serve().await;
    let registry = registry(addr, "empty", tokens(addr, "svc@project.iam.gserviceaccount.com"));

    assert_eq!(registry.fetch_rows().await, Err(RegistryError::EmptyRange));
}

#[tokio::test]
async fn rows_without_emails_are_an_empty_range() {
    let (addr, _upstream) = serve().await;
    let registry = registry(
        addr,
        "blank-emails",
        tokens(addr, "svc@project.iam.gserviceaccount.com"),
    );

    assert_eq!(registry.fetch_rows().await, Err(RegistryError::EmptyRange));
}

#[tokio::test]
async fn api_errors_carry_status_but_not_body() {
    let (addr, _upstream) = serve().await;
    let registry = registry(addr, "forbidden", tokens(addr, "svc@project.iam.gserviceaccount.com"));

    match registry.fetch_rows().await {
        Err(RegistryError::Api { status, message }) => {
            assert_eq!(status, 403);
            assert!(message.starts_with("upstream error (len="));
            assert!(!message.contains("permission"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_exchange_is_an_auth_error() {
    let (addr, upstream) = serve().await;
    let registry = registry(addr, "sheet-1", tokens(addr, REVOKED));

    assert!(matches!(
        registry.fetch_rows().await,
        Err(RegistryError::Auth(_))
    ));
    assert_eq!(*upstream.exchanges.lock().unwrap(), 0);
}

#[tokio::test]
async fn unauthorized_response_drops_the_cached_token() {
    let (addr, upstream) = serve().await;
    let registry = registry(addr, "stale", tokens(addr, "svc@project.iam.gserviceaccount.com"));

    assert!(matches!(
        registry.fetch_rows().await,
        Err(RegistryError::Api { status: 401, .. })
    ));
    assert_eq!(registry.fetch_rows().await.unwrap().len(), 3);
    assert_eq!(*upstream.exchanges.lock().unwrap(), 2);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let registry = SheetsRegistry::new(
        reqwest::Client::new(),
        "sheet-1",
        &SheetLayout::default(),
        Arc::new(sheets_registry::StaticToken("tok-1".to_string())),
    )
    .unwrap()
    .with_base_url("http://127.0.0.1:1/v4/spreadsheets");

    assert!(matches!(
        registry.fetch_rows().await,
        Err(RegistryError::Transport(_))
    ));
}
