//! Common test utilities for in-process API testing.
//!
//! The fixture builds the full router over an in-memory queue store,
//! so tests exercise the real middleware, handlers, and queue manager
//! without binding a socket.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use anteroom_core::config::{ServerConfig, StoreConfig};
use anteroom_core::{
    create_authenticator, AuthConfig, AuthMethod, Authenticator, Config, MemoryQueueStore,
    QueueManager, QueueNotifier, QueueSettings, QueueStore, ScopeId, StoreBackend,
};
use anteroom_server::{create_router, AppState};

/// In-process test server over an in-memory store.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Store handle for direct state inspection and manipulation
    pub store: Arc<dyn QueueStore>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture with open auth and a small active capacity.
    pub fn new(capacity: u32) -> Self {
        let settings = QueueSettings {
            capacity,
            ..Default::default()
        };
        Self::build(
            AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            },
            settings,
        )
    }

    /// Fixture with API-key auth, for admin-gating tests.
    pub fn with_api_key(key: &str, capacity: u32) -> Self {
        let settings = QueueSettings {
            capacity,
            ..Default::default()
        };
        Self::build(
            AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some(key.to_string()),
            },
            settings,
        )
    }

    fn build(auth: AuthConfig, settings: QueueSettings) -> Self {
        let config = Config {
            auth: auth.clone(),
            server: ServerConfig::default(),
            store: StoreConfig {
                backend: StoreBackend::Memory,
                ..Default::default()
            },
            queue: settings.clone(),
        };

        let authenticator: Arc<dyn Authenticator> =
            Arc::from(create_authenticator(&auth).expect("Failed to create authenticator"));
        let store: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());
        let notifier = Arc::new(QueueNotifier::default());
        let manager = Arc::new(QueueManager::new(
            Arc::clone(&store),
            notifier,
            settings,
        ));

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            Arc::clone(&store),
            manager,
        ));
        let router = create_router(state);

        Self { router, store }
    }

    /// Rewrite a ticket's deadline so its active window has elapsed.
    pub fn force_expiry(&self, scope: &str, ticket_id: &str) {
        let scope: ScopeId = scope.parse().expect("bad scope in test");
        let mut record = self
            .store
            .get_ticket(&scope, ticket_id)
            .expect("store error")
            .expect("ticket not found");
        record.active_expires_at = Some(Utc::now() - Duration::seconds(1));
        self.store.put_ticket(&record).expect("store error");
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("GET", path, None, headers).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a POST request with JSON body and extra headers.
    pub async fn post_with_headers(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request("POST", path, Some(body), headers).await
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
