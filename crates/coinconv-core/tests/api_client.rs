mod common;

use coinconv_core::{ApiError, CurrencyCode};

use common::{anonymous_session, client, spawn_api, token_for};

#[tokio::test]
async fn test_anonymous_request_has_no_authorization_header() {
    let api = spawn_api(&token_for("user-1", 3600)).await;
    let session = anonymous_session();

    client(&api, &session)
        .fetch_latest_rates()
        .await
        .expect("rates");
    assert_eq!(*api.state.last_authorization.lock().expect("lock"), None);
}

#[tokio::test]
async fn test_authenticated_request_carries_bearer_token() {
    let token = token_for("user-1", 3600);
    let api = spawn_api(&token).await;
    let session = anonymous_session();
    assert!(session.login(&token, false));

    client(&api, &session)
        .fetch_latest_rates()
        .await
        .expect("rates");
    assert_eq!(
        api.state.last_authorization.lock().expect("lock").clone(),
        Some(format!("Bearer {token}"))
    );
}

#[tokio::test]
async fn test_unauthorized_response_clears_session_before_returning() {
    let api = spawn_api(&token_for("server-side", 3600)).await;
    let session = anonymous_session();
    // A valid-looking token the server does not recognise
    assert!(session.login(&token_for("revoked", 3600), true));

    let err = client(&api, &session)
        .fetch_profile()
        .await
        .expect_err("profile should be rejected");

    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert!(!session.is_authenticated());
    assert_eq!(session.store().load(), None);
}

#[tokio::test]
async fn test_latest_rates_keep_supported_currencies_only() {
    let api = spawn_api(&token_for("user-1", 3600)).await;
    let session = anonymous_session();

    let rates = client(&api, &session)
        .fetch_latest_rates()
        .await
        .expect("rates");
    assert_eq!(rates.get(CurrencyCode::Eur), Some(0.9));
    assert_eq!(rates.get(CurrencyCode::Usdt), None);
    assert_eq!(rates.iter().count(), 3);
}

#[tokio::test]
async fn test_unreachable_api_is_a_network_error() {
    let session = anonymous_session();
    let client = coinconv_core::ApiClient::new("http://127.0.0.1:9", session.clone()).expect("client");

    let err = client.fetch_latest_rates().await.expect_err("nothing listens on port 9");
    assert!(matches!(err, ApiError::NetworkError(_)));
}
