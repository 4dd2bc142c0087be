//! Bearer token payload decoding.
//!
//! Tokens use the JWT compact serialization: `header.payload.signature`,
//! each segment base64url encoded. Only the payload is read. The signature
//! is NOT verified; the API server is trusted as the only issuer of tokens
//! that reach the store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Number of `.`-separated segments in a compact token
const TOKEN_SEGMENTS: usize = 3;

/// Identity claims carried in the token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Expiry as seconds since the Unix epoch. `None` means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<f64>,
}

impl Claims {
    /// Expiry instant, if the token carries one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp
            .and_then(|exp| DateTime::from_timestamp_millis((exp * 1000.0) as i64))
    }

    /// A token is expired once `exp * 1000 <= now` in milliseconds
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.exp {
            Some(exp) => exp * 1000.0 <= now.timestamp_millis() as f64,
            None => false,
        }
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at().map(|at| at - now)
    }

    /// Best human-readable name: `name`, then "first last", then email, then subject
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.email.clone().unwrap_or_else(|| self.sub.clone())
    }
}

/// Why a token was rejected. Only used for logging; callers of [`decode`]
/// see every failure as `None`.
#[derive(Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("expected 3 segments, found {0}")]
    Segments(usize),

    #[error("payload is not valid base64url")]
    Encoding,

    #[error("payload is not a valid claims object: {0}")]
    Payload(String),

    #[error("token expired at {0}")]
    Expired(f64),
}

/// Parse the payload segment without looking at the clock.
pub fn parse(raw: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = raw.trim().split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(TokenError::Segments(segments.len()));
    }

    // Some issuers keep the `=` padding; the no-pad engine rejects it.
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| TokenError::Encoding)?;

    serde_json::from_slice(&payload).map_err(|e| TokenError::Payload(e.to_string()))
}

/// Parse and check expiry against `now`.
pub fn validate_at(raw: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
    let claims = parse(raw)?;
    if claims.is_expired_at(now) {
        return Err(TokenError::Expired(claims.exp.unwrap_or_default()));
    }
    Ok(claims)
}

/// Decode a token as of `now`. Malformed and expired tokens both yield `None`.
pub fn decode_at(raw: &str, now: DateTime<Utc>) -> Option<Claims> {
    match validate_at(raw, now) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!(reason = %e, "Rejected bearer token");
            None
        }
    }
}

/// Decode a token against the current wall clock.
pub fn decode(raw: &str) -> Option<Claims> {
    decode_at(raw, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{make_token, token_expiring_in};
    use serde_json::json;

    #[test]
    fn test_decode_valid_token() {
        let token = token_expiring_in("user-42", Duration::hours(1));
        let claims = decode(&token).expect("valid token should decode");
        assert_eq!(claims.sub, "user-42");
        assert!(claims.exp.is_some());
    }

    #[test]
    fn test_decode_without_exp_never_expires() {
        let token = make_token(&json!({ "sub": "abc", "email": "a@b.c" }));
        let far_future = Utc::now() + Duration::days(365 * 50);
        let claims = decode_at(&token, far_future).expect("token without exp");
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
        assert!(claims.expires_at().is_none());
    }

    #[test]
    fn test_decode_expired_token_is_none() {
        let token = token_expiring_in("user-1", Duration::seconds(-10));
        assert!(decode(&token).is_none());
        assert!(matches!(validate_at(&token, Utc::now()), Err(TokenError::Expired(_))));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("valid instant");
        let token = make_token(&json!({ "sub": "x", "exp": 1_700_000_000 }));
        assert!(decode_at(&token, now).is_none());
        assert!(decode_at(&token, now - Duration::milliseconds(5)).is_some());
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert_eq!(parse("not-a-token"), Err(TokenError::Segments(1)));
        assert_eq!(parse("a.b.c.d"), Err(TokenError::Segments(4)));
        assert_eq!(parse("a.!!!.c"), Err(TokenError::Encoding));

        // Valid base64, not JSON
        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("hello"));
        assert!(matches!(parse(&not_json), Err(TokenError::Payload(_))));

        // JSON array instead of an object
        let array = format!("h.{}.s", URL_SAFE_NO_PAD.encode("[1,2]"));
        assert!(decode(&array).is_none());
    }

    #[test]
    fn test_decode_rejects_missing_sub_and_bad_exp_type() {
        assert!(decode(&make_token(&json!({ "email": "a@b.c" }))).is_none());
        assert!(decode(&make_token(&json!({ "sub": "a", "exp": "tomorrow" }))).is_none());
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"p"}"#);
        assert!(payload.ends_with('='));
        let claims = decode(&format!("h.{payload}.s")).expect("padded payload");
        assert_eq!(claims.sub, "p");
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut claims: Claims =
            serde_json::from_value(json!({ "sub": "id-1", "firstName": "Gabriela", "lastName": "Reyes" }))
                .expect("claims");
        assert_eq!(claims.display_name(), "Gabriela Reyes");

        claims.name = Some("Gaby".to_string());
        assert_eq!(claims.display_name(), "Gaby");

        claims.name = None;
        claims.first_name = None;
        claims.last_name = None;
        assert_eq!(claims.display_name(), "id-1");

        claims.email = Some("gaby@email.com".to_string());
        assert_eq!(claims.display_name(), "gaby@email.com");
    }
}
