//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use gatehouse::auth::UserId;
use gatehouse::config::GateConfig;
use gatehouse::http::{Backends, HttpServer};
use gatehouse::lifecycle::Shutdown;
use gatehouse::store::memory::MemoryBackends;

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub backends: MemoryBackends,
    pub client: reqwest::Client,
    shutdown: Arc<Shutdown>,
    handle: JoinHandle<()>,
}

/// Config with the limiter off, so tests issuing many requests from
/// 127.0.0.1 are not throttled.
pub fn unlimited_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.rate_limit.enabled = false;
    config
}

pub async fn spawn_server(config: GateConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let backends = MemoryBackends::new();
    let server = HttpServer::new(config, Backends::from(backends.clone()));
    let shutdown = Arc::new(Shutdown::new());

    let server_shutdown = Arc::clone(&shutdown);
    let handle = tokio::spawn(async move {
        server.run(listener, &server_shutdown).await.unwrap();
    });

    TestServer {
        addr,
        backends,
        client: reqwest::Client::new(),
        shutdown,
        handle,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register, activate and log in a user; returns its id and bearer token.
    pub async fn activated_user(&self, email: &str) -> (UserId, String) {
        let (id, activation) = self.register(email).await;
        let res = self
            .client
            .put(self.url("/v1/users/activated"))
            .json(&json!({ "token": activation }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200, "activation of {email}");

        (id, self.login(email).await)
    }

    /// Register a user; returns its id and the activation token.
    pub async fn register(&self, email: &str) -> (UserId, String) {
        let res = self
            .client
            .post(self.url("/v1/users"))
            .json(&json!({ "name": "Test User", "email": email, "password": "pa55word" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 202, "registration of {email}");

        let body: Value = res.json().await.unwrap();
        let id = body["user"]["id"].as_i64().unwrap();
        let token = body["activation_token"]["token"].as_str().unwrap().to_string();
        (UserId(id), token)
    }

    pub async fn login(&self, email: &str) -> String {
        self.login_with(email, "pa55word").await
    }

    pub async fn login_with(&self, email: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.url("/v1/tokens/authentication"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201, "login of {email}");

        let body: Value = res.json().await.unwrap();
        body["authentication_token"]["token"].as_str().unwrap().to_string()
    }

    /// Create a movie through the API; returns its id.
    pub async fn create_movie(&self, token: &str, body: Value) -> i64 {
        let res = self
            .client
            .post(self.url("/v1/movies"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201, "creation of {body}");

        let body: Value = res.json().await.unwrap();
        body["movie"]["id"].as_i64().unwrap()
    }

    pub fn grant(&self, user: UserId, code: &str) {
        self.backends.permissions.grant(user, [code]);
    }

    pub async fn stop(self) {
        self.shutdown.drain(Duration::from_secs(5)).await;
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}
