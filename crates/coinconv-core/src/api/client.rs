//! API client for the coin-converter REST API.
//!
//! Every request reads the session token when it is built and sends it as
//! a bearer credential. A 401 response logs that token out before the
//! error is returned. Nothing is retried.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::SessionController;
use crate::converter::RateTable;
use crate::models::User;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/auth/login";
const PROFILE_PATH: &str = "/auth/profile";
const LATEST_RATES_PATH: &str = "/api/rates/latest";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Body returned by the login endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// API client bound to one session.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionController,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionController) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS), session)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        session: SessionController,
    ) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a request carrying `token` as a bearer credential, if any
    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and map non-2xx statuses to `ApiError`. On 401 the token that
    /// was sent is logged out first.
    async fn execute(
        &self,
        builder: RequestBuilder,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        if error.is_unauthorized() {
            let cleared = self.session.logout_if_current(token);
            warn!(cleared, "Request unauthorized, session token invalidated");
        } else {
            debug!(status = status.as_u16(), "Request failed");
        }
        Err(error)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn get_as<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T, ApiError> {
        let response = self
            .execute(self.request(Method::GET, path, token), token)
            .await?;
        Self::read_json(response, path).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let token = self.session.token();
        self.get_as(path, token.as_deref()).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        let token = self.session.token();
        let builder = self.request(Method::POST, path, token.as_deref()).json(body);
        let response = self.execute(builder, token.as_deref()).await?;
        Self::read_json(response, path).await
    }

    // ===== Endpoints =====

    /// Exchange credentials for an access token. Does not touch the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.post(LOGIN_PATH, &LoginRequest { email, password }).await
    }

    /// Profile of the user owning the current session token
    pub async fn fetch_profile(&self) -> Result<User, ApiError> {
        self.get(PROFILE_PATH).await
    }

    /// Profile fetched with an explicit token
    pub async fn fetch_profile_with(&self, token: &str) -> Result<User, ApiError> {
        self.get_as(PROFILE_PATH, Some(token)).await
    }

    /// Latest rates relative to USD
    pub async fn fetch_latest_rates(&self) -> Result<RateTable, ApiError> {
        let raw: HashMap<String, f64> = self.get(LATEST_RATES_PATH).await?;
        let rates = RateTable::from_codes(&raw);
        if rates.is_empty() {
            return Err(ApiError::InvalidResponse(
                "rates response contained no supported currencies".to_string(),
            ));
        }
        Ok(rates)
    }
}
