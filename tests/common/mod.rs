//! Shared harness: a server on an ephemeral port backed by the in-memory user store

#![allow(dead_code)]

use clap::Parser;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

use devagent::db::MemoryUserStore;
use devagent::{serve, AppState, Args};

/// Nothing listens here, so outbound calls fail fast
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Start a dev-mode server; `extra` flags replace the defaults of the same name
    pub async fn start(extra: &[&str]) -> Self {
        let defaults = [
            ("--together-api-url", UNREACHABLE),
            ("--groq-api-url", UNREACHABLE),
            ("--oumi-api-url", UNREACHABLE),
            ("--kestra-api-url", UNREACHABLE),
            ("--public-url", "http://devagent.test"),
        ];

        let mut argv = vec!["devagent".to_string(), "--dev-mode".to_string()];
        for (flag, value) in defaults {
            if !extra.contains(&flag) {
                argv.push(flag.to_string());
                argv.push(value.to_string());
            }
        }
        argv.extend(extra.iter().map(|s| s.to_string()));

        let args = Args::parse_from(argv);
        let state = AppState::new(args, Arc::new(MemoryUserStore::new()), None)
            .expect("state builds in dev mode");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(state)));

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            base_url: format!("http://{}", addr),
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Each request looks like a different client unless `client_ip` is given
    fn forwarded(client_ip: Option<&str>) -> String {
        client_ip
            .map(str::to_string)
            .unwrap_or_else(|| format!("10.0.{}.{}", next_octet(), next_octet()))
    }

    pub async fn post(&self, path: &str, body: Value, token: Option<&str>) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, Some(body), token, None).await
    }

    pub async fn put(&self, path: &str, body: Value, token: Option<&str>) -> (u16, Value) {
        self.send(reqwest::Method::PUT, path, Some(body), token, None).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (u16, Value) {
        self.send(reqwest::Method::GET, path, None, token, None).await
    }

    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
        client_ip: Option<&str>,
    ) -> (u16, Value) {
        let response = self.raw(method, path, body, token, client_ip).await;
        let status = response.status().as_u16();
        let json = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn raw(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
        client_ip: Option<&str>,
    ) -> reqwest::Response {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header("x-forwarded-for", Self::forwarded(client_ip));
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }
}

fn next_octet() -> u8 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static NEXT: AtomicU16 = AtomicU16::new(1);
    (NEXT.fetch_add(1, Ordering::Relaxed) % 250) as u8 + 1
}

/// `token` query value of a reset or verification link
pub fn token_from_link(link: &str) -> String {
    link.split("token=").nth(1).unwrap_or_default().to_string()
}
