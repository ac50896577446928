//! Integration tests for the OIDC token source using wiremock.

use std::sync::Arc;
use std::time::Duration;

use scout_auth::{
    AuthError, AuthToken, OidcGrant, OidcTokenSource, RefreshPolicy, Session, SessionTokenSource,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/realms/scout/protocol/openid-connect/token";

fn token_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "expires_in": expires_in,
        "refresh_token": refresh,
        "token_type": "Bearer",
    })
}

fn source(server: &MockServer, grant: OidcGrant) -> OidcTokenSource {
    OidcTokenSource::new(format!("{}{TOKEN_PATH}", server.uri()), "scout-web", grant)
}

#[tokio::test]
async fn password_grant_logs_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=ada%40example.com"))
        .and(body_string_contains("client_id=scout-web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-1", 300)))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada@example.com", "hunter2"));
    let token = source.login().await.unwrap();
    token.with_secret(|t| assert_eq!(t, "access-1"));
    assert!(token.expires_within(Duration::from_secs(301)));
    assert!(!token.expires_within(Duration::from_secs(200)));
}

#[tokio::test]
async fn bad_credentials_are_auth_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada", "wrong"));
    let err = source.login().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthFailed(body) if body.contains("invalid_grant")));
}

#[tokio::test]
async fn server_errors_are_backend_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada", "pw"));
    let err = source.login().await.unwrap_err();
    assert!(matches!(err, AuthError::BackendError(msg) if msg.contains("503")));
}

#[tokio::test]
async fn hung_token_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("late", "r", 300))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada", "pw")).timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let err = source.login().await.unwrap_err();
    assert!(matches!(err, AuthError::BackendError(msg) if msg.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn refresh_skips_tokens_with_enough_validity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a", "r", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada", "pw"));
    let token = source.login().await.unwrap();
    let refreshed = source.refresh(&token, Duration::from_secs(70)).await.unwrap();
    assert!(refreshed.is_none());
}

#[tokio::test]
async fn refresh_uses_latest_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-1", 30)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-2", 300)))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada", "pw"));
    let token = source.login().await.unwrap();
    let fresh = source
        .refresh(&token, Duration::from_secs(70))
        .await
        .unwrap()
        .expect("token expiring in 30s must refresh");
    fresh.with_secret(|t| assert_eq!(t, "access-2"));
}

#[tokio::test]
async fn refresh_after_logout_fails_without_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a", "r", 10)))
        .mount(&server)
        .await;

    let source = source(&server, OidcGrant::password("ada", "pw"));
    let token = source.login().await.unwrap();
    source.logout().await.unwrap();
    let err = source.refresh(&token, Duration::from_secs(70)).await.unwrap_err();
    assert!(matches!(err, AuthError::AuthFailed(_)));
}

#[tokio::test]
async fn refresh_token_grant_bootstraps_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=offline-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-2", 300)))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(source(&server, OidcGrant::refresh_token("offline-1")));
    let session = Session::start(source, RefreshPolicy::default()).await.unwrap();
    let token = session.current_token().expect("logged in");
    token.with_secret(|t| assert_eq!(t, "access-1"));
    session.logout().await.unwrap();
    assert!(!session.is_authenticated());
}

#[test]
fn expired_token_always_needs_refresh() {
    let token = AuthToken::new("t", Some(std::time::SystemTime::UNIX_EPOCH));
    assert!(token.is_expired());
}
