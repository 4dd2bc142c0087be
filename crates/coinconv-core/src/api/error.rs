use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape used by the API. Validation failures carry a list.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: ErrorMessage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// The `message` field of a JSON error body, if there is one
    fn server_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        let message = match parsed.message {
            ErrorMessage::One(message) => message,
            ErrorMessage::Many(messages) => messages.join("; "),
        };
        (!message.trim().is_empty()).then_some(message)
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::server_message(body).unwrap_or_else(|| Self::truncate_body(body));
        match status.as_u16() {
            401 if message.is_empty() => ApiError::Unauthorized("token may be expired".to_string()),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            code => ApiError::Rejected {
                status: code,
                message: if message.is_empty() { status.to_string() } else { message },
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Text suitable for showing to a user: the server's own message when
    /// it sent one, otherwise the error description.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(message)
            | ApiError::AccessDenied(message)
            | ApiError::NotFound(message)
            | ApiError::ServerError(message)
            | ApiError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_uses_server_message() {
        let err = ApiError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"statusCode":401,"message":"Invalid credentials"}"#,
        );
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message(), "Invalid credentials");
    }

    #[test]
    fn test_from_status_joins_validation_messages() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"message":["email must be an email","password is too short"]}"#,
        );
        assert!(matches!(err, ApiError::Rejected { status: 400, .. }));
        assert_eq!(err.user_message(), "email must be an email; password is too short");
    }

    #[test]
    fn test_from_status_without_body() {
        assert_eq!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, "").user_message(),
            "token may be expired"
        );
        assert!(matches!(
            ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::RateLimited
        ));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }
}
