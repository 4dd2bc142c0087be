//! Local stand-in for the coin-converter API.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use coinconv_core::auth::{SessionController, TokenStore};
use coinconv_core::ApiClient;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "secret123";

pub fn make_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Token for `sub` expiring `ttl_secs` from now (negative for the past)
pub fn token_for(sub: &str, ttl_secs: i64) -> String {
    make_token(&json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "firstName": "Gabriela",
        "lastName": "Reyes",
        "exp": Utc::now().timestamp() + ttl_secs,
    }))
}

#[derive(Default)]
pub struct MockState {
    /// Token handed out by the login endpoint
    pub issued_token: Mutex<String>,
    /// Artificial latency for the profile endpoint
    pub profile_delay: Mutex<Duration>,
    /// Authorization header of the most recent request, if any
    pub last_authorization: Mutex<Option<String>>,
}

impl MockState {
    fn record(&self, headers: &HeaderMap) {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.last_authorization.lock().expect("lock") = value;
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.issued_token.lock().expect("lock"));
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(expected.as_str())
    }
}

pub struct MockApi {
    pub base_url: String,
    pub state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "statusCode": 401, "message": message })),
    )
        .into_response()
}

async fn login(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Response {
    state.record(&headers);
    if body.email.is_empty() || body.password != PASSWORD {
        return unauthorized("Invalid credentials");
    }
    let token = state.issued_token.lock().expect("lock").clone();
    Json(json!({ "access_token": token })).into_response()
}

async fn profile(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    let delay = *state.profile_delay.lock().expect("lock");
    tokio::time::sleep(delay).await;
    if !state.is_authorized(&headers) {
        return unauthorized("Unauthorized");
    }
    Json(json!({
        "id": "user-1",
        "email": "gaby@email.com",
        "firstName": "Gabriela",
        "lastName": "Reyes",
    }))
    .into_response()
}

async fn rates(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.record(&headers);
    Json(json!({ "USD": 1, "EUR": 0.9, "VES": 40.0, "GBP": 0.8 })).into_response()
}

pub async fn spawn_api(issued_token: &str) -> MockApi {
    let state = Arc::new(MockState::default());
    *state.issued_token.lock().expect("lock") = issued_token.to_string();

    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/profile", get(profile))
        .route("/api/rates/latest", get(rates))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock api");
    let addr = listener.local_addr().expect("local addr");
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockApi {
        base_url: format!("http://{addr}/"),
        state,
        task,
    }
}

pub fn anonymous_session() -> SessionController {
    let session = SessionController::new(TokenStore::in_memory("access_token"));
    session.initialize();
    session
}

pub fn client(api: &MockApi, session: &SessionController) -> ApiClient {
    ApiClient::new(&api.base_url, session.clone()).expect("client")
}
