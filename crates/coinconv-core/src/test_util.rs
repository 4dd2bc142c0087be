//! Helpers for building unsigned tokens in tests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

pub(crate) fn make_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

/// Token for `sub` whose `exp` lies `ttl` from now (negative for the past)
pub(crate) fn token_expiring_in(sub: &str, ttl: Duration) -> String {
    let exp = (Utc::now() + ttl).timestamp_millis() as f64 / 1000.0;
    make_token(&json!({ "sub": sub, "exp": exp }))
}
