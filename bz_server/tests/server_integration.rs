//! Integration tests for the HTTP API.
//!
//! Every test builds its own router over a fresh in-memory store and drives
//! it with `oneshot`, so no server or database is needed.

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use bz_server::{
    api::{AppState, create_router},
    config::ServerConfig,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicI64, Ordering};
use tower::ServiceExt; // For `oneshot` method

const ADMIN_EMAIL: &str = "admin@betzona.test";
const PASSWORD: &str = "SecurePass123";

static NEXT_TEAM: AtomicI64 = AtomicI64::new(100);

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::with_secrets(
        "test_secret_key_for_testing_only_0123456789",
        "test_pepper_for_testing_only",
    );
    config.accounts.starting_balance = dec!(100.00);
    config.accounts.admin_emails = vec![ADMIN_EMAIL.to_string()];
    config
}

struct TestApp {
    router: Router,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: ServerConfig) -> Self {
        Self {
            router: create_router(AppState::in_memory(&config)),
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.send(Method::GET, uri, token, None).await
    }

    /// Register and log in, returning `(user_id, token)`
    async fn signup(&self, email: &str) -> (i64, String) {
        let reply = self
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({"name": "Test Player", "email": email, "password": PASSWORD})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        let user_id = reply.body["id"].as_i64().unwrap();

        let reply = self
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"email": email, "password": PASSWORD})),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        (user_id, reply.body["token"].as_str().unwrap().to_string())
    }

    /// Schedule a match with fresh teams starting `start_in` from now
    async fn create_match(&self, admin_token: &str, start_in: Duration) -> i64 {
        let home = NEXT_TEAM.fetch_add(2, Ordering::Relaxed);
        let start = Utc::now() + start_in;
        let reply = self
            .send(
                Method::POST,
                "/api/v1/admin/matches",
                Some(admin_token),
                Some(json!({
                    "tournament_id": 1,
                    "home_team_id": home,
                    "away_team_id": home + 1,
                    "start_time": start,
                    "end_time": start + Duration::hours(2),
                    "stadium": "Central Arena",
                    "referee": null
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
        reply.body["id"].as_i64().unwrap()
    }

    async fn place(&self, token: &str, match_id: i64, amount: &str) -> Reply {
        self.send(
            Method::POST,
            "/api/v1/bets",
            Some(token),
            Some(json!({
                "match_id": match_id,
                "bet_type": "win",
                "amount": amount,
                "odds": "2.50"
            })),
        )
        .await
    }

    async fn balance(&self, token: &str) -> String {
        let reply = self.get("/api/v1/users/me", Some(token)).await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.body["balance"].as_str().unwrap().to_string()
    }
}

fn assert_error(reply: &Reply, status: StatusCode, error: &str) {
    assert_eq!(reply.status, status, "{}", reply.body);
    assert_eq!(reply.body["status"], status.as_u16());
    assert_eq!(reply.body["error"], error);
    assert!(reply.body["message"].is_string());
}

// ============================================================================
// Health & Plumbing
// ============================================================================

#[tokio::test]
async fn test_health_check_endpoint() {
    let app = TestApp::new();
    let reply = app.get("/health", None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "healthy");
    assert_eq!(reply.body["storage"], "in-memory");
}

#[tokio::test]
async fn test_request_id_header_is_set_and_echoed() {
    let app = TestApp::new();

    let reply = app.get("/health", None).await;
    assert!(reply.headers.contains_key("x-request-id"));

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-me-42")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me-42");
}

#[tokio::test]
async fn test_unknown_route_uses_error_payload() {
    let app = TestApp::new();
    let reply = app.get("/api/v1/nope", None).await;
    assert_error(&reply, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn test_rate_limit_returns_429_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.max_requests = 3;
    config.rate_limit.window_secs = 60;
    let app = TestApp::with_config(config);

    for _ in 0..3 {
        assert_eq!(app.get("/health", None).await.status, StatusCode::OK);
    }
    let reply = app.get("/health", None).await;
    assert_error(&reply, StatusCode::TOO_MANY_REQUESTS, "rate_limited");

    let retry_after: u64 = reply.headers[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn test_rate_limit_is_per_client_ip() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let app = TestApp::with_config(config);

    let from = |ip: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.router.clone().oneshot(from("10.0.0.1")).await.unwrap();
    let second = app.router.clone().oneshot(from("10.0.0.1")).await.unwrap();
    let other = app.router.clone().oneshot(from("10.0.0.2")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other.status(), StatusCode::OK);
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_register_and_login() {
    let app = TestApp::new();
    let reply = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"name": "Ana", "email": "Ana@Example.com", "password": PASSWORD})),
        )
        .await;

    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["email"], "ana@example.com");
    assert_eq!(reply.body["role"], "user");
    assert_eq!(reply.body["balance"], "100.00");
    assert!(reply.body.get("password_hash").is_none());

    let reply = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "ana@example.com", "password": PASSWORD})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["token_type"], "Bearer");
    assert_eq!(reply.body["expires_in"], 24 * 3600);
    assert!(reply.body["token"].as_str().unwrap().len() > 20);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = TestApp::new();
    app.signup("dup@example.com").await;

    let reply = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"name": "Other", "email": "dup@example.com", "password": PASSWORD})),
        )
        .await;
    assert_error(&reply, StatusCode::CONFLICT, "conflict");
}

#[tokio::test]
async fn test_register_weak_password_rejected() {
    let app = TestApp::new();
    let reply = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"name": "Weak", "email": "weak@example.com", "password": "short"})),
        )
        .await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let app = TestApp::new();
    app.signup("wrongpw@example.com").await;

    let reply = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "wrongpw@example.com", "password": "NotThePass1"})),
        )
        .await;
    assert_error(&reply, StatusCode::UNAUTHORIZED, "unauthorized");
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::new();

    let reply = app.get("/api/v1/bets", None).await;
    assert_error(&reply, StatusCode::UNAUTHORIZED, "unauthorized");

    let reply = app.get("/api/v1/users/me", Some("garbage.token.value")).await;
    assert_error(&reply, StatusCode::UNAUTHORIZED, "unauthorized");
}

#[tokio::test]
async fn test_blocked_account_is_refused_with_live_token() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (user_id, token) = app.signup("blocked@example.com").await;

    let reply = app
        .send(
            Method::PATCH,
            &format!("/api/v1/admin/users/{user_id}/status"),
            Some(&admin),
            Some(json!({"status": "blocked"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "blocked");

    let reply = app.get("/api/v1/users/me", Some(&token)).await;
    assert_error(&reply, StatusCode::FORBIDDEN, "forbidden");

    let reply = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "blocked@example.com", "password": PASSWORD})),
        )
        .await;
    assert_error(&reply, StatusCode::FORBIDDEN, "forbidden");
}

// ============================================================================
// Matches
// ============================================================================

#[tokio::test]
async fn test_admin_routes_reject_regular_users() {
    let app = TestApp::new();
    let (_, token) = app.signup("regular@example.com").await;

    let reply = app
        .send(
            Method::POST,
            "/api/v1/admin/matches",
            Some(&token),
            Some(json!({})),
        )
        .await;
    assert_error(&reply, StatusCode::FORBIDDEN, "forbidden");
}

#[tokio::test]
async fn test_match_listing_and_filters() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let first = app.create_match(&admin, Duration::days(1)).await;
    let second = app.create_match(&admin, Duration::days(2)).await;

    let reply = app
        .send(
            Method::PATCH,
            &format!("/api/v1/admin/matches/{second}"),
            Some(&admin),
            Some(json!({"status": "postponed"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app.get("/api/v1/matches", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["meta"]["total"], 2);
    assert_eq!(reply.body["meta"]["page"], 1);
    assert_eq!(reply.body["meta"]["limit"], 10);

    let reply = app.get("/api/v1/matches?status=scheduled", None).await;
    assert_eq!(reply.body["meta"]["total"], 1);
    assert_eq!(reply.body["data"][0]["id"], first);

    let reply = app.get("/api/v1/matches?status=bogus", None).await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");

    let reply = app.get(&format!("/api/v1/matches/{first}"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["stadium"], "Central Arena");

    let reply = app.get("/api/v1/matches/999999", None).await;
    assert_error(&reply, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn test_overlapping_match_conflicts() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let start = Utc::now() + Duration::days(3);

    let schedule = |home: i64, away: i64| {
        json!({
            "tournament_id": 7,
            "home_team_id": home,
            "away_team_id": away,
            "start_time": start,
            "end_time": start + Duration::hours(2),
        })
    };

    let reply = app
        .send(Method::POST, "/api/v1/admin/matches", Some(&admin), Some(schedule(1, 2)))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = app
        .send(Method::POST, "/api/v1/admin/matches", Some(&admin), Some(schedule(2, 3)))
        .await;
    assert_error(&reply, StatusCode::CONFLICT, "conflict");
}

// ============================================================================
// Bets
// ============================================================================

#[tokio::test]
async fn test_place_list_get_cancel_roundtrip() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (user_id, token) = app.signup("bettor@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    let reply = app.place(&token, match_id, "20.00").await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.body["user_id"], user_id);
    assert_eq!(reply.body["status"], "pending");
    assert_eq!(reply.body["amount"], "20.00");
    let bet_id = reply.body["id"].as_i64().unwrap();
    assert_eq!(app.balance(&token).await, "80.00");

    let reply = app.get("/api/v1/bets", Some(&token)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["meta"]["total"], 1);
    assert_eq!(reply.body["data"][0]["id"], bet_id);

    let reply = app.get(&format!("/api/v1/bets/{bet_id}"), Some(&token)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["match_id"], match_id);

    let reply = app
        .send(
            Method::DELETE,
            &format!("/api/v1/bets/{bet_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    assert_eq!(reply.body["bet"]["status"], "cancelled");
    assert_eq!(reply.body["balance"], "100.00");
    assert_eq!(app.balance(&token).await, "100.00");

    // Cached reads are dropped after the cancellation
    let reply = app.get(&format!("/api/v1/bets/{bet_id}"), Some(&token)).await;
    assert_eq!(reply.body["status"], "cancelled");
    let reply = app.get("/api/v1/bets?status=pending", Some(&token)).await;
    assert_eq!(reply.body["meta"]["total"], 0);
}

#[tokio::test]
async fn test_second_pending_bet_on_match_conflicts() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("twice@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    assert_eq!(
        app.place(&token, match_id, "10.00").await.status,
        StatusCode::CREATED
    );
    let reply = app.place(&token, match_id, "10.00").await;
    assert_error(&reply, StatusCode::CONFLICT, "conflict");
    assert_eq!(app.balance(&token).await, "90.00");
}

#[tokio::test]
async fn test_insufficient_funds_is_402() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("poor@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    let reply = app.place(&token, match_id, "150.00").await;
    assert_error(&reply, StatusCode::PAYMENT_REQUIRED, "insufficient_funds");
    assert_eq!(app.balance(&token).await, "100.00");
}

#[tokio::test]
async fn test_invalid_bet_input_is_400() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("sloppy@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    let reply = app.place(&token, match_id, "0").await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");

    let reply = app.place(&token, match_id, "1.234").await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");

    let reply = app
        .send(
            Method::POST,
            "/api/v1/bets",
            Some(&token),
            Some(json!({
                "match_id": match_id,
                "bet_type": "moneyline",
                "amount": "5.00",
                "odds": "2.00"
            })),
        )
        .await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");

    for odds in ["1.00001", "10000000"] {
        let reply = app
            .send(
                Method::POST,
                "/api/v1/bets",
                Some(&token),
                Some(json!({
                    "match_id": match_id,
                    "bet_type": "win",
                    "amount": "5.00",
                    "odds": odds
                })),
            )
            .await;
        assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");
    }
}

#[tokio::test]
async fn test_bet_on_unknown_match_is_404() {
    let app = TestApp::new();
    let (_, token) = app.signup("lost@example.com").await;

    let reply = app.place(&token, 424242, "5.00").await;
    assert_error(&reply, StatusCode::NOT_FOUND, "not_found");
}

#[tokio::test]
async fn test_bet_on_started_match_is_422() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("late@example.com").await;
    let match_id = app.create_match(&admin, Duration::minutes(-5)).await;

    let reply = app.place(&token, match_id, "5.00").await;
    assert_error(&reply, StatusCode::UNPROCESSABLE_ENTITY, "invalid_state");
    assert_eq!(app.balance(&token).await, "100.00");
}

#[tokio::test]
async fn test_cancel_after_match_goes_live_is_422() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("stuck@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    let bet_id = app.place(&token, match_id, "30.00").await.body["id"]
        .as_i64()
        .unwrap();

    let reply = app
        .send(
            Method::PATCH,
            &format!("/api/v1/admin/matches/{match_id}"),
            Some(&admin),
            Some(json!({"status": "live"})),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app
        .send(
            Method::DELETE,
            &format!("/api/v1/bets/{bet_id}"),
            Some(&token),
            None,
        )
        .await;
    assert_error(&reply, StatusCode::UNPROCESSABLE_ENTITY, "invalid_state");
    assert_eq!(app.balance(&token).await, "70.00");
}

#[tokio::test]
async fn test_other_users_bet_forbidden_on_cancel_hidden_on_get() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, owner) = app.signup("owner@example.com").await;
    let (_, intruder) = app.signup("intruder@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    let bet_id = app.place(&owner, match_id, "10.00").await.body["id"]
        .as_i64()
        .unwrap();

    let reply = app
        .send(
            Method::DELETE,
            &format!("/api/v1/bets/{bet_id}"),
            Some(&intruder),
            None,
        )
        .await;
    assert_error(&reply, StatusCode::FORBIDDEN, "forbidden");

    let reply = app.get(&format!("/api/v1/bets/{bet_id}"), Some(&intruder)).await;
    assert_error(&reply, StatusCode::NOT_FOUND, "not_found");

    let reply = app.get("/api/v1/bets", Some(&intruder)).await;
    assert_eq!(reply.body["meta"]["total"], 0);
}

#[tokio::test]
async fn test_double_cancel_is_422() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("again@example.com").await;
    let match_id = app.create_match(&admin, Duration::days(1)).await;

    let bet_id = app.place(&token, match_id, "10.00").await.body["id"]
        .as_i64()
        .unwrap();
    let uri = format!("/api/v1/bets/{bet_id}");

    assert_eq!(
        app.send(Method::DELETE, &uri, Some(&token), None).await.status,
        StatusCode::OK
    );
    let reply = app.send(Method::DELETE, &uri, Some(&token), None).await;
    assert_error(&reply, StatusCode::UNPROCESSABLE_ENTITY, "invalid_state");
    assert_eq!(app.balance(&token).await, "100.00");
}

#[tokio::test]
async fn test_bet_list_pagination_and_bad_filters() {
    let app = TestApp::new();
    let (_, admin) = app.signup(ADMIN_EMAIL).await;
    let (_, token) = app.signup("pager@example.com").await;

    for _ in 0..3 {
        let match_id = app.create_match(&admin, Duration::days(1)).await;
        assert_eq!(
            app.place(&token, match_id, "5.00").await.status,
            StatusCode::CREATED
        );
    }

    let reply = app.get("/api/v1/bets?page=2&limit=2", Some(&token)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["meta"]["total"], 3);
    assert_eq!(reply.body["meta"]["offset"], 2);
    assert_eq!(reply.body["data"].as_array().unwrap().len(), 1);

    let today = Utc::now().date_naive();
    let reply = app
        .get(
            &format!("/api/v1/bets?start_date={today}&end_date={today}&bet_type=win"),
            Some(&token),
        )
        .await;
    assert_eq!(reply.body["meta"]["total"], 3);

    let reply = app.get("/api/v1/bets?match_id=abc", Some(&token)).await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");

    let reply = app.get("/api/v1/bets?start_date=03-01-2025", Some(&token)).await;
    assert_error(&reply, StatusCode::BAD_REQUEST, "validation_error");
}
