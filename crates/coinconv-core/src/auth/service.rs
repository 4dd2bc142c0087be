//! Sign-in and profile flows.

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::User;

use super::{Claims, SessionController};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("{0}")]
    SignIn(String),

    #[error("The server returned a token that is malformed or already expired")]
    InvalidToken,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Drives the API client and the session together.
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn session(&self) -> &SessionController {
        self.api.session()
    }

    /// Exchange credentials for a token and start a session with it.
    /// Any failure leaves the session anonymous.
    pub async fn sign_in(&self, email: &str, password: &str, remember: bool) -> Result<Claims, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let response = match self.api.login(email, password).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Sign-in request failed");
                self.session().logout();
                return Err(AuthError::SignIn(e.user_message()));
            }
        };

        if !self.session().login(&response.access_token, remember) {
            return Err(AuthError::InvalidToken);
        }
        info!(remember, "Sign-in complete");
        self.session().claims().ok_or(AuthError::InvalidToken)
    }

    pub fn sign_out(&self) {
        self.session().logout();
    }

    /// Fetch the profile for the current token. Returns `None` when there is
    /// no session, or when the session changed while the request was in
    /// flight; a late result never revives a finished session.
    pub async fn fetch_profile(&self) -> Result<Option<User>, AuthError> {
        let Some(token) = self.session().token() else {
            return Ok(None);
        };
        let user = self.api.fetch_profile_with(&token).await?;
        Ok(self.session().apply_if_current(&token, |_| user))
    }
}
