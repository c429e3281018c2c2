//! Account, session and settings flows over HTTP

mod common;

use common::{token_from_link, TestServer};
use serde_json::json;

async fn sign_in(server: &TestServer, email: &str, password: &str) -> (u16, serde_json::Value) {
    server
        .post(
            "/api/auth/callback/credentials",
            json!({"email": email, "password": password}),
            None,
        )
        .await
}

#[tokio::test]
async fn test_signup_signin_and_password_reset() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server
        .post(
            "/api/auth/signup",
            json!({"email": "Ada@Example.com ", "password": "secret1", "name": "Ada"}),
            None,
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["message"], "User created successfully");
    assert_eq!(body["user"]["email"], "ada@example.com");
    let verification_link = body["verificationLink"].as_str().unwrap().to_string();

    // Same address in a different case is the same account
    let (status, body) = server
        .post(
            "/api/auth/signup",
            json!({"email": "ada@example.com", "password": "secret1"}),
            None,
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "User already exists");

    let (status, body) = sign_in(&server, "ada@example.com", "wrong-password").await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = sign_in(&server, "nobody@example.com", "secret1").await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = sign_in(&server, "ada@example.com", "secret1").await;
    assert_eq!(status, 200);
    assert_eq!(body["user"]["name"], "Ada");
    assert!(body["expiresAt"].as_str().is_some());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = server.get("/api/auth/session", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, body) = server
        .post(
            "/api/auth/verify-email",
            json!({"token": token_from_link(&verification_link)}),
            None,
        )
        .await;
    assert_eq!(status, 200, "{body}");

    let (status, body) = server.get("/api/user/profile", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(body["emailVerified"], true);

    let (status, body) = server
        .post("/api/auth/forgot-password", json!({"email": "ada@example.com"}), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["message"],
        "If an account exists, a password reset link has been sent"
    );
    let reset_token = token_from_link(body["resetLink"].as_str().unwrap());

    let (status, body) = server
        .post(
            "/api/auth/reset-password",
            json!({"token": reset_token, "password": "short"}),
            None,
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Password must be at least 6 characters");

    let (status, body) = server
        .post(
            "/api/auth/reset-password",
            json!({"token": reset_token, "password": "brand-new"}),
            None,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Password reset successful");

    // Tokens are single use
    let (status, body) = server
        .post(
            "/api/auth/reset-password",
            json!({"token": reset_token, "password": "another-one"}),
            None,
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid or expired reset token");

    let (status, _) = sign_in(&server, "ada@example.com", "secret1").await;
    assert_eq!(status, 401);
    let (status, _) = sign_in(&server, "ada@example.com", "brand-new").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_signup_validation() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server
        .post("/api/auth/signup", json!({"email": "a@b.co"}), None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Email and password are required");

    let (status, body) = server
        .post(
            "/api/auth/signup",
            json!({"email": "a@b.co", "password": "12345"}),
            None,
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Password must be at least 6 characters");
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let server = TestServer::start(&[]).await;

    let (status, body) = server
        .post("/api/auth/forgot-password", json!({}), None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Email is required");

    let (status, body) = server
        .post("/api/auth/forgot-password", json!({"email": "nobody@example.com"}), None)
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["message"],
        "If an account exists, a password reset link has been sent"
    );
    assert!(body.get("resetLink").is_none());
}

#[tokio::test]
async fn test_api_keys_and_profile() {
    let server = TestServer::start(&[]).await;

    let (status, _) = server.get("/api/user/api-keys", None).await;
    assert_eq!(status, 401);

    server
        .post(
            "/api/auth/signup",
            json!({"email": "grace@example.com", "password": "hopper1"}),
            None,
        )
        .await;
    let (_, body) = sign_in(&server, "grace@example.com", "hopper1").await;
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = server.get("/api/user/api-keys", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(body["apiKeys"], json!({}));

    let (status, body) = server
        .post(
            "/api/user/api-keys",
            json!({"togetherAI": "tg-1234567890abcdef", "groq": "short", "oumi": "  "}),
            Some(&token),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "API keys updated successfully");

    let (_, body) = server.get("/api/user/api-keys", Some(&token)).await;
    assert_eq!(body["apiKeys"]["togetherAI"], "tg-12345...cdef");
    assert_eq!(body["apiKeys"]["groq"], "****");
    assert!(body["apiKeys"].get("oumi").is_none());

    let (status, body) = server
        .put(
            "/api/user/profile",
            json!({"name": "Grace Hopper", "preferences": {"theme": "dark"}}),
            Some(&token),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Profile updated successfully");

    let (status, body) = server.get("/api/user/profile", Some(&token)).await;
    assert_eq!(status, 200);
    assert_eq!(body["email"], "grace@example.com");
    assert_eq!(body["name"], "Grace Hopper");
    assert_eq!(body["preferences"]["theme"], "dark");
    assert_eq!(body["emailVerified"], false);

    let (status, _) = server
        .send(reqwest::Method::DELETE, "/api/user/profile", None, Some(&token), None)
        .await;
    assert_eq!(status, 405);
}

#[tokio::test]
async fn test_session_and_providers() {
    let server = TestServer::start(&[
        "--github-client-id",
        "gh-id",
        "--github-client-secret",
        "gh-secret",
    ])
    .await;

    let (status, body) = server.get("/api/auth/session", None).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({}));

    let (status, body) = server.get("/api/auth/session", Some("not-a-jwt")).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({}));

    let (status, body) = server.get("/api/auth/providers", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["providers"], json!(["credentials", "github"]));

    let (status, body) = server.post("/api/auth/signout", json!({}), None).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);

    let response = server
        .raw(reqwest::Method::GET, "/api/auth/signin/github", None, None, None)
        .await;
    assert_eq!(response.status().as_u16(), 302);
    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.starts_with("https://github.com/login/oauth/authorize?"));
    assert!(location.contains("client_id=gh-id"));

    let (status, _) = server.get("/api/auth/signin/myspace", None).await;
    assert_eq!(status, 404);

    // A callback with a state this server never issued goes back to sign-in
    let response = server
        .raw(
            reqwest::Method::GET,
            "/api/auth/callback/github?code=abc&state=forged",
            None,
            None,
            None,
        )
        .await;
    assert_eq!(response.status().as_u16(), 302);
    assert_eq!(
        response.headers()["location"],
        "http://devagent.test/auth/signin?error=OAuthCallback"
    );
}

#[tokio::test]
async fn test_credential_endpoints_are_rate_limited() {
    let server = TestServer::start(&[]).await;

    for _ in 0..5 {
        let (status, _) = server
            .send(
                reqwest::Method::POST,
                "/api/auth/forgot-password",
                Some(json!({"email": "x@example.com"})),
                None,
                Some("203.0.113.7"),
            )
            .await;
        assert_eq!(status, 200);
    }

    let response = server
        .raw(
            reqwest::Method::POST,
            "/api/auth/forgot-password",
            Some(json!({"email": "x@example.com"})),
            None,
            Some("203.0.113.7"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 429);
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests");

    // Another client is unaffected
    let (status, _) = server
        .send(
            reqwest::Method::POST,
            "/api/auth/forgot-password",
            Some(json!({"email": "x@example.com"})),
            None,
            Some("203.0.113.8"),
        )
        .await;
    assert_eq!(status, 200);
}
