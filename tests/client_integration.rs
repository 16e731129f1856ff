//! End-to-end tests against a mock HTTP server.
//!
//! The base-URL override routes the users, thumbnails, and friends endpoints
//! to one wiremock instance, so these tests exercise the full pipeline:
//! cache, rate window, retries, classification, and the session gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rbx_users::{ApiError, ClientConfig, RobloxClient};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .base_url(server.uri())
        .retry_delays(Duration::from_millis(10), Duration::from_millis(50))
        .build()
        .unwrap()
}

fn client_for(server: &MockServer) -> RobloxClient {
    init_tracing();
    RobloxClient::new(test_config(server)).unwrap()
}

/// Run with `RUST_LOG=rbx_users=debug` to see the pipeline's traces.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn profile_body(id: u64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "displayName": name,
        "description": "",
        "created": "2006-02-27T21:06:40.300Z",
        "hasVerifiedBadge": false,
    })
}

/// Serves every follower/following/friend count endpoint with a fixed count.
async fn mount_counts(server: &MockServer, count: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/users/\d+/(followers|followings|friends)/count$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": count })))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == wanted)
        .count()
}

#[tokio::test]
async fn cache_hit_avoids_second_http_call() {
    let server = MockServer::start().await;
    mount_counts(&server, 10).await;
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body(1, "Roblox")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.get_user(1).await.unwrap();
    let second = client.get_user(1).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.follower_count, 10);
    assert_eq!(requests_to(&server, "/v1/users/1").await, 1);

    let metrics = client.metrics();
    assert_eq!(metrics.sample_count, 2);
    assert_eq!(metrics.cache_hit_rate, 50.0);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    mount_counts(&server, 0).await;
    Mock::given(method("GET"))
        .and(path("/v1/users/999"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client.get_user(999).await.unwrap_err();

    assert!(matches!(error, ApiError::NotFound(_)));
    assert_eq!(requests_to(&server, "/v1/users/999").await, 1);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    mount_counts(&server, 3).await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = Arc::clone(&attempts);
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                ResponseTemplate::new(500)
            } else {
                ResponseTemplate::new(200).set_body_json(profile_body(1, "Roblox"))
            }
        })
        .mount(&server)
        .await;

    let client = client_for(&server);
    let user = client.get_user(1).await.unwrap();

    assert_eq!(user.username, "Roblox");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limit_retry_after_hint_is_honored() {
    let server = MockServer::start().await;
    mount_counts(&server, 0).await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = Arc::clone(&attempts);
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(429).insert_header("Retry-After", "1")
            } else {
                ResponseTemplate::new(200).set_body_json(profile_body(1, "Roblox"))
            }
        })
        .mount(&server)
        .await;

    let client = client_for(&server);
    let started = Instant::now();
    let user = client.get_user(1).await.unwrap();

    assert_eq!(user.id, 1);
    // The server asked for a one second wait; the backoff alone is 10 ms.
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn timed_out_request_is_retried_as_a_network_failure() {
    let server = MockServer::start().await;
    mount_counts(&server, 0).await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = Arc::clone(&attempts);
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
            let template = ResponseTemplate::new(200).set_body_json(profile_body(1, "Roblox"));
            if attempts_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                // Longer than the client's per-call timeout.
                template.set_delay(Duration::from_millis(500))
            } else {
                template
            }
        })
        .mount(&server)
        .await;

    init_tracing();
    let config = ClientConfig::builder()
        .base_url(server.uri())
        .timeout(Duration::from_millis(100))
        .retry_delays(Duration::from_millis(10), Duration::from_millis(50))
        .build()
        .unwrap();
    let client = RobloxClient::new(config).unwrap();

    let user = client.get_user(1).await.unwrap();
    assert_eq!(user.id, 1);
    // First attempt timed out, the retry succeeded.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_deduplicates_and_preserves_order() {
    let server = MockServer::start().await;
    mount_counts(&server, 1).await;
    for id in [1u64, 2] {
        Mock::given(method("GET"))
            .and(path(format!("/v1/users/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(profile_body(id, &format!("user{id}"))),
            )
            .mount(&server)
            .await;
    }

    let client = client_for(&server);
    let profiles = client.get_users_batch(&[1, 1, 2]).await.unwrap();

    let ids: Vec<u64> = profiles.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1, 1, 2]);
    assert_eq!(requests_to(&server, "/v1/users/1").await, 1);
    assert_eq!(requests_to(&server, "/v1/users/2").await, 1);
}

#[tokio::test]
async fn batch_shares_the_cache_with_single_lookups() {
    let server = MockServer::start().await;
    mount_counts(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body(1, "Roblox")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.get_user(1).await.unwrap();
    let profiles = client.get_users_batch(&[1]).await.unwrap();

    assert_eq!(profiles.len(), 1);
    assert_eq!(requests_to(&server, "/v1/users/1").await, 1);
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let ids: Vec<u64> = (0..101).collect();
    let error = client.get_users_batch(&ids).await.unwrap_err();

    assert!(matches!(error, ApiError::Api { status: 400, .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn resolves_username_then_fetches_profile() {
    let server = MockServer::start().await;
    mount_counts(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/v1/usernames/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "requestedUsername": "Roblox", "id": 1, "name": "Roblox" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body(1, "Roblox")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let user = client.get_user_by_username("Roblox").await.unwrap();

    assert_eq!(user.id, 1);
    assert_eq!(user.follower_count, 2);
}

#[tokio::test]
async fn unknown_username_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/usernames/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client.get_user_by_username("no_such_user").await.unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));
}

#[tokio::test]
async fn failed_thumbnail_degrades_to_empty_url() {
    let server = MockServer::start().await;
    for (endpoint, url) in
        [("avatar-headshot", "https://cdn.example/headshot.png"), ("avatar", "https://cdn.example/full.png")]
    {
        Mock::given(method("GET"))
            .and(path(format!("/v1/users/{endpoint}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "targetId": 1, "state": "Completed", "imageUrl": url }]
            })))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v1/users/avatar-bust"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let avatar = client.get_user_avatar(1).await.unwrap();

    assert_eq!(avatar.headshot_url, "https://cdn.example/headshot.png");
    assert_eq!(avatar.full_body_url, "https://cdn.example/full.png");
    assert!(avatar.bust_url.is_empty());

    // A partially degraded avatar is still cached.
    client.get_user_avatar(1).await.unwrap();
    assert_eq!(requests_to(&server, "/v1/users/avatar-headshot").await, 1);
}

#[tokio::test]
async fn fully_degraded_avatar_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/users/avatar(-headshot|-bust)?$"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let avatar = client.get_user_avatar(1).await.unwrap();
    assert!(avatar.headshot_url.is_empty());
    assert!(avatar.bust_url.is_empty());
    assert!(avatar.full_body_url.is_empty());

    // Nothing usable was cached, so the next call hits the endpoints again.
    client.get_user_avatar(1).await.unwrap();
    assert_eq!(requests_to(&server, "/v1/users/avatar-headshot").await, 2);
}

#[tokio::test]
async fn social_list_limit_is_clamped_to_100() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/1/friends"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [profile_body(2, "friend")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let friends = client.get_friends(1, 250).await.unwrap();

    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].id, 2);
}

#[tokio::test]
async fn warm_cache_prefetches_profiles() {
    let server = MockServer::start().await;
    mount_counts(&server, 0).await;
    for id in [1u64, 2] {
        Mock::given(method("GET"))
            .and(path(format!("/v1/users/{id}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(profile_body(id, &format!("user{id}"))),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client_for(&server);
    client.warm_cache(&[1, 2]).await;

    // Both profiles now come from the cache.
    client.get_user(1).await.unwrap();
    client.get_user(2).await.unwrap();
    assert_eq!(requests_to(&server, "/v1/users/1").await, 1);
    assert_eq!(requests_to(&server, "/v1/users/2").await, 1);
}

#[tokio::test]
async fn close_drains_in_flight_requests_and_rejects_new_ones() {
    let server = MockServer::start().await;
    mount_counts(&server, 0).await;
    Mock::given(method("GET"))
        .and(path("/v1/users/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(profile_body(1, "Roblox"))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));
    let in_flight = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.get_user(1).await })
    };

    // Let the request reach the wire before closing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    client.close().await;

    // close() waited for the delayed response instead of cutting it off.
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(in_flight.await.unwrap().is_ok());

    let error = client.get_user(1).await.unwrap_err();
    assert_eq!(error, ApiError::Network("client is closed".into()));
    assert!(client.is_closed());
}
