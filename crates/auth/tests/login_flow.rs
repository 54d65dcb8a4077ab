//! End-to-end login lifecycle against a mock provider.

use std::sync::Arc;
use std::time::Duration;

use fankit_auth::testing::RecordingSleeper;
use fankit_auth::usage::NoopUsageRecorder;
use fankit_auth::{AuthError, AuthService, ProviderConfig};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CALLBACK: &str = "https://app.example/auth/callback";

fn service_with_sleeper(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> AuthService {
    let config = ProviderConfig::new("client-id", "client-secret")
        .with_api_base(server.uri())
        .with_authorize_url(format!("{}/i/oauth2/authorize", server.uri()));
    AuthService::with_collaborators(config, None, sleeper, Arc::new(NoopUsageRecorder)).unwrap()
}

fn service(server: &MockServer) -> AuthService {
    service_with_sleeper(server, Arc::new(RecordingSleeper::default()))
}

fn token_json(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "token_type": "bearer",
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 7200,
        "scope": "users.read tweet.read follows.read offline.access",
    })
}

fn me_json() -> serde_json::Value {
    serde_json::json!({
        "data": {
            "id": "42",
            "name": "Some Body",
            "username": "somebody",
            "profile_image_url": "https://pbs.example/img/s_normal.jpg",
        }
    })
}

async fn mount_happy_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("access-1", "refresh-1")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me_json()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_login_round_trip() {
    let server = MockServer::start().await;
    mount_happy_provider(&server).await;
    let service = service(&server);

    let redirect = service.begin_login(CALLBACK, false).await.unwrap();
    let query: std::collections::HashMap<String, String> =
        redirect.url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["state"], redirect.state);
    assert_eq!(query["code_challenge_method"], "S256");
    assert!(query.contains_key("code_challenge"));

    let outcome = service.complete_login(&redirect.state, "auth-code").await.unwrap();
    assert_eq!(outcome.tokens.access_token, "access-1");
    assert_eq!(outcome.tokens.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(outcome.profile.id, "42");
    assert_eq!(outcome.profile.handle, "somebody");
    assert_eq!(
        outcome.profile.profile_image_url.as_deref(),
        Some("https://pbs.example/img/s_400x400.jpg")
    );
}

#[tokio::test]
async fn state_tokens_are_single_use() {
    let server = MockServer::start().await;
    mount_happy_provider(&server).await;
    let service = service(&server);

    let redirect = service.begin_login(CALLBACK, false).await.unwrap();
    service.complete_login(&redirect.state, "auth-code").await.unwrap();

    // Replaying the callback must fail without reaching the token endpoint
    // a second time.
    let error = service.complete_login(&redirect.state, "auth-code").await.unwrap_err();
    assert!(matches!(error, AuthError::HandshakeNotFound), "got {error:?}");
    assert!(error.requires_relogin());
}

#[tokio::test]
async fn forged_state_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("a", "r")))
        .expect(0)
        .mount(&server)
        .await;
    let service = service(&server);

    let error = service.complete_login("forged-state", "auth-code").await.unwrap_err();
    assert!(matches!(error, AuthError::HandshakeNotFound));
}

#[tokio::test]
async fn rate_limited_token_exchange_waits_and_recovers() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 2;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-rate-limit-limit", "15")
                .insert_header("x-rate-limit-remaining", "0")
                .insert_header("x-rate-limit-reset", reset.to_string().as_str()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("access-1", "refresh-1")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(me_json()))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let service = service_with_sleeper(&server, sleeper.clone());

    let redirect = service.begin_login(CALLBACK, false).await.unwrap();
    let outcome = service.complete_login(&redirect.state, "auth-code").await.unwrap();
    assert_eq!(outcome.tokens.access_token, "access-1");

    // One header-driven wait: roughly the 2s until reset plus the buffer.
    let slept = sleeper.slept();
    assert_eq!(slept.len(), 1);
    assert!(slept[0] >= Duration::from_secs(1), "waited only {:?}", slept[0]);
    assert!(slept[0] <= Duration::from_secs(4), "waited {:?}", slept[0]);
}

#[tokio::test]
async fn refresh_rotation_kills_the_old_token() {
    let server = MockServer::start().await;
    // First presentation of refresh-1 succeeds and rotates.
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("access-2", "refresh-2")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // Any later presentation is rejected, as the provider does after rotation.
    Mock::given(method("POST"))
        .and(path("/2/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_request",
            "error_description": "Value passed for the token was invalid.",
        })))
        .mount(&server)
        .await;

    let service = service(&server);

    let rotated = service.refresh("refresh-1").await.unwrap();
    assert_eq!(rotated.access_token, "access-2");
    assert_eq!(rotated.refresh_token.as_deref(), Some("refresh-2"));

    let error = service.refresh("refresh-1").await.unwrap_err();
    assert!(matches!(error, AuthError::RefreshTokenInvalid), "got {error:?}");
    assert!(error.requires_relogin());
}

#[tokio::test]
async fn relationship_check_degrades_instead_of_failing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by/username/target"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = service(&server);
    let status = service.check_relationship("42", "access-1", "@target").await;

    assert!(status.skipped);
    assert!(!status.is_related);
}

#[tokio::test]
async fn relationship_check_is_served_from_cache_within_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by/username/target"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": { "id": "777", "name": "Target", "username": "target" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2/users/42/following"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [ { "id": "777" } ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&server);

    let first = service.check_relationship("42", "access-1", "target").await;
    let second = service.check_relationship("42", "access-1", "target").await;
    assert!(first.is_related);
    assert!(second.is_related);
}

#[tokio::test]
async fn unknown_handle_resolves_to_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/users/by/username/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let service = service(&server);
    let profile = service.get_profile_by_handle("@ghost", "access-1").await.unwrap();
    assert!(profile.is_none());
}

#[tokio::test]
async fn revoke_reports_acknowledgement_without_failing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/revoke"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = service(&server);
    assert!(!service.revoke("access-1").await);
}

#[tokio::test]
async fn logout_revokes_both_tokens_and_never_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/revoke"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "revoked": true })))
        .expect(2)
        .mount(&server)
        .await;

    let service = service(&server);
    service.logout("access-1", Some("refresh-1")).await;
}

#[tokio::test]
async fn logout_swallows_provider_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/oauth2/revoke"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = service(&server);
    // Must return normally even when every revocation fails.
    service.logout("access-1", Some("refresh-1")).await;
}
