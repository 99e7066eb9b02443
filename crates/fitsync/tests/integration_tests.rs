//! Integration tests for the fitsync crate
//!
//! These tests run the complete flow against a mock Strava: OAuth callback,
//! token exchange, activity download and SQLite persistence.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fitsync::{
    ActivityStore, ApiError, AuthError, AuthorizationPrompt, CredentialStore, OAuthConfig,
    SqliteStore, StravaAuth, StravaClient, SyncOptions, high_water_mark, sync_strava,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Plays the operator's browser: follows the authorization URL straight to
/// the redirect with a canned code
struct BrowserSimulator {
    code: &'static str,
    /// Overrides the state echoed back
    state: Option<&'static str>,
    /// Sends `error=` instead of a code
    deny: bool,
    presented: Arc<AtomicUsize>,
}

impl BrowserSimulator {
    fn approving() -> Self {
        Self {
            code: "test-code",
            state: None,
            deny: false,
            presented: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl AuthorizationPrompt for BrowserSimulator {
    fn present(&self, auth_url: &str) {
        self.presented.fetch_add(1, Ordering::SeqCst);

        let url = url::Url::parse(auth_url).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let state = self.state.map(str::to_string).unwrap_or_else(|| params["state"].clone());

        let redirect = if self.deny {
            format!("{}?error=access_denied&state={}", params["redirect_uri"], state)
        } else {
            format!("{}?state={}&code={}", params["redirect_uri"], state, self.code)
        };

        // Error pages come back as 4xx; the outcome is checked through the auth result
        let _ = ureq::get(&redirect).call();
    }
}

fn oauth_config(server_uri: &str) -> OAuthConfig {
    let mut config = OAuthConfig::new("test-client", "test-secret");
    config.authorize_url = format!("{}/oauth/authorize", server_uri);
    config.token_url = format!("{}/oauth/token", server_uri);
    config.api_base_url = format!("{}/api/v3", server_uri);
    config.callback_addr = "127.0.0.1:0".to_string();
    config
}

fn token_body(access_token: &str, expires_at: DateTime<Utc>) -> Value {
    json!({
        "token_type": "Bearer",
        "access_token": access_token,
        "refresh_token": "refresh-1",
        "expires_at": expires_at.timestamp(),
        "expires_in": 21600,
        "athlete": { "id": 134815 }
    })
}

fn activity(id: u64, name: &str, start: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "external_id": format!("garmin_push_{}", id),
        "name": name,
        "type": "Run",
        "sport_type": "Run",
        "start_date": start.to_rfc3339(),
        "distance": 10000.0,
        "moving_time": 3000
    })
}

fn open_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(dir.path().join("database.db")).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_sync_against_mock_strava() {
    let server = MockServer::start().await;
    let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=test-code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("abc123", Utc::now() + Duration::hours(6))),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Newest first; the engine must not rely on the order
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(query_param("after", "0"))
        .and(header("Authorization", "Bearer abc123"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Limit", "600,30000")
                .insert_header("X-RateLimit-Usage", "1,10")
                .set_body_json(json!([
                    activity(2002, "Tempo", t2),
                    activity(2001, "Easy", t1)
                ])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(query_param("after", t2.timestamp().to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let prompt = BrowserSimulator::approving();
        let presented = prompt.presented.clone();
        let auth = StravaAuth::new(oauth_config(&uri), &store).with_prompt(prompt);

        assert!(!auth.is_authenticated());

        // First run: empty store, full history requested
        let stats = sync_strava(&auth, &store, &SyncOptions::default()).unwrap();
        assert_eq!(stats.activities_stored, 2);
        assert_eq!(stats.previous_high_water_mark, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(stats.high_water_mark, t2);
        assert_eq!(store.count_activities().unwrap(), 2);
        assert!(auth.is_authenticated());

        // Second run: reuses the stored token, nothing new
        let stats = sync_strava(&auth, &store, &SyncOptions::default()).unwrap();
        assert_eq!(stats.activities_stored, 0);
        assert_eq!(stats.high_water_mark, t2);
        assert_eq!(store.count_activities().unwrap(), 2);
        assert_eq!(presented.load(Ordering::SeqCst), 1);

        // State survives reopening the database
        drop(auth);
        drop(store);
        let store = open_store(&dir);
        assert_eq!(high_water_mark(&store).unwrap(), t2);
        assert!(store.get_credential("strava").unwrap().is_some());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_token_is_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("stale", Utc::now() - Duration::minutes(5))),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": "fresh",
                "expires_at": (Utc::now() + Duration::hours(6)).timestamp()
            })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 134815 })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let prompt = BrowserSimulator::approving();
        let presented = prompt.presented.clone();
        let auth = StravaAuth::new(oauth_config(&uri), &store).with_prompt(prompt);

        // Browser flow hands out an already-expired token
        auth.obtain_client().unwrap();
        assert!(!auth.is_authenticated());

        // Refresh instead of another browser round trip
        let client = auth.obtain_client().unwrap();
        assert!(auth.is_authenticated());
        assert_eq!(presented.load(Ordering::SeqCst), 1);

        let athlete = client.get_athlete().unwrap();
        assert!(String::from_utf8(athlete).unwrap().contains("134815"));
    })
    .await
    .unwrap();
}

fn expired_blob(refresh_token: Option<&str>, expires_at: DateTime<Utc>) -> Vec<u8> {
    let mut token = json!({
        "access_token": "old-token",
        "token_type": "Bearer",
        "expires_at": expires_at.timestamp()
    });
    if let Some(refresh_token) = refresh_token {
        token["refresh_token"] = json!(refresh_token);
    }
    serde_json::to_vec(&token).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expired_token_without_refresh_runs_browser_flow() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=test-code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("new-token", Utc::now() + Duration::hours(6))),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v3/athlete"))
        .and(header("Authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 134815 })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let expired_at = Utc::now() - Duration::hours(1);
        store
            .put_credential("strava", &expired_blob(None, expired_at), expired_at)
            .unwrap();

        let prompt = BrowserSimulator::approving();
        let presented = prompt.presented.clone();
        let auth = StravaAuth::new(oauth_config(&uri), &store).with_prompt(prompt);
        assert!(!auth.is_authenticated());

        let client = auth.obtain_client().unwrap();
        assert_eq!(presented.load(Ordering::SeqCst), 1);
        assert!(auth.is_authenticated());
        client.get_athlete().unwrap();

        // The expired record was replaced
        let credential = store.get_credential("strava").unwrap().unwrap();
        assert!(credential.expires_at > Utc::now());
        let blob: Value = serde_json::from_slice(&credential.blob).unwrap();
        assert_eq!(blob["access_token"], "new-token");
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_refresh_falls_back_to_browser_flow() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r-old"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "Bad Request",
            "errors": [{ "resource": "RefreshToken", "field": "refresh_token", "code": "invalid" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("new-token", Utc::now() + Duration::hours(6))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let expired_at = Utc::now() - Duration::hours(1);
        store
            .put_credential("strava", &expired_blob(Some("r-old"), expired_at), expired_at)
            .unwrap();

        let prompt = BrowserSimulator::approving();
        let presented = prompt.presented.clone();
        let auth = StravaAuth::new(oauth_config(&uri), &store).with_prompt(prompt);

        auth.obtain_client().unwrap();
        assert_eq!(presented.load(Ordering::SeqCst), 1);
        assert!(auth.is_authenticated());

        let credential = store.get_credential("strava").unwrap().unwrap();
        let blob: Value = serde_json::from_slice(&credential.blob).unwrap();
        assert_eq!(blob["access_token"], "new-token");
        assert_eq!(blob["refresh_token"], "refresh-1");
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forged_state_aborts_before_token_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("nope", Utc::now())))
        .expect(0)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let prompt = BrowserSimulator {
            state: Some("forged"),
            ..BrowserSimulator::approving()
        };
        let auth = StravaAuth::new(oauth_config(&uri), &store).with_prompt(prompt);

        let err = auth.obtain_client().unwrap_err();
        match err.downcast_ref::<AuthError>() {
            Some(AuthError::StateMismatch { expected, actual }) => {
                assert_eq!(expected, OAuthConfig::STATE);
                assert_eq!(actual, "forged");
            }
            other => panic!("expected a state mismatch, got {:?}", other),
        }
        assert!(store.get_credential("strava").unwrap().is_none());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_denied_authorization() {
    let server = MockServer::start().await;
    let uri = server.uri();

    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let prompt = BrowserSimulator {
            deny: true,
            ..BrowserSimulator::approving()
        };
        let auth = StravaAuth::new(oauth_config(&uri), &store).with_prompt(prompt);

        let err = auth.obtain_client().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::Denied(reason)) if reason == "access_denied"
        ));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_api_status_classification() {
    let server = MockServer::start().await;

    for (route, status) in [
        ("/ok", 200u16),
        ("/unauthorized", 401),
        ("/limited", 429),
        ("/broken", 500),
    ] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(status)
                    .insert_header("X-RateLimit-Limit", "600,30000")
                    .insert_header("X-RateLimit-Usage", "27,1041")
                    .set_body_string("{}"),
            )
            .mount(&server)
            .await;
    }

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let client = StravaClient::new("token", uri.clone());

        let body = client.fetch(&format!("{}/ok", uri)).unwrap();
        assert_eq!(body, b"{}");

        assert!(matches!(
            client.fetch(&format!("{}/unauthorized", uri)),
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            client.fetch(&format!("{}/limited", uri)),
            Err(ApiError::RateLimited)
        ));
        assert!(matches!(
            client.fetch(&format!("{}/broken", uri)),
            Err(ApiError::UnexpectedStatus(500))
        ));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_page_keeps_store_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    tokio::task::spawn_blocking(move || {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let client = StravaClient::new("token", format!("{}/api/v3", uri));

        let err = fitsync::sync_activities(&client, &store, &SyncOptions::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::RateLimited)));
        assert_eq!(store.count_activities().unwrap(), 0);
    })
    .await
    .unwrap();
}
