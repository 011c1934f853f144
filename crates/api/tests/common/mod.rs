#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use kbase_api::config::{ImportConfig, RateLimitConfig, ServerConfig, StorageConfig};
use kbase_api::engine::{ImportEngine, Stores};
use kbase_api::generation::{ContentGenerator, GeneratedContent, GenerationRequest};
use kbase_api::router::build_app_router;
use kbase_api::state::AppState;
use kbase_core::error::CoreError;
use kbase_core::memory::{MemoryCounterStore, MemoryEntryStore, MemoryJobStore, MemoryObjectStore};
use kbase_core::rate_limit::{AdmissionController, CounterStore, RateLimitPolicy, TierLimit, WindowUsage};
use kbase_core::stores::StoreError;
use tower::ServiceExt;

pub const BOUNDARY: &str = "kbase-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        redis_url: None,
        storage: StorageConfig::S3 {
            bucket: "test".to_string(),
            public_base_url: "http://localhost/files".to_string(),
        },
        import: ImportConfig::default(),
        rate_limit: RateLimitConfig::default(),
        stale_job_timeout_secs: 0,
        generation: None,
    }
}

/// Rate-limit policy small enough to exhaust in a test.
pub fn tight_policy(global: u64, user: u64, ip: u64) -> RateLimitPolicy {
    let tier = |max_requests| TierLimit {
        max_requests,
        window: Duration::from_secs(60),
    };
    RateLimitPolicy {
        global: tier(global),
        user: tier(user),
        ip: tier(ip),
    }
}

/// Generator that echoes the prompt back.
pub struct EchoGenerator;

#[async_trait]
impl ContentGenerator for EchoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, CoreError> {
        Ok(GeneratedContent {
            content: format!("echo: {}", request.prompt),
            model: "echo".to_string(),
        })
    }
}

/// Counter store that is always down.
pub struct DownCounterStore;

#[async_trait]
impl CounterStore for DownCounterStore {
    async fn record_hit(&self, _key: &str, _window: Duration) -> Result<WindowUsage, StoreError> {
        Err(StoreError::unavailable("counter_store", "connection refused"))
    }
}

/// The in-memory stores behind a test app, for direct inspection.
pub struct TestStores {
    pub jobs: Arc<MemoryJobStore>,
    pub entries: Arc<MemoryEntryStore>,
    pub objects: Arc<MemoryObjectStore>,
}

pub struct TestAppBuilder {
    config: ServerConfig,
    counters: Arc<dyn CounterStore>,
    generator: Option<Arc<dyn ContentGenerator>>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            counters: Arc::new(MemoryCounterStore::new()),
            generator: Some(Arc::new(EchoGenerator)),
        }
    }

    pub fn policy(mut self, policy: RateLimitPolicy) -> Self {
        self.config.rate_limit.policy = policy;
        self
    }

    pub fn counters(mut self, counters: Arc<dyn CounterStore>) -> Self {
        self.counters = counters;
        self
    }

    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.config.rate_limit.fail_open = fail_open;
        self
    }

    pub fn without_generator(mut self) -> Self {
        self.generator = None;
        self
    }

    /// Build the full application router with all middleware layers over
    /// in-memory stores.
    pub fn build(self) -> (Router, TestStores) {
        let stores = TestStores {
            jobs: Arc::new(MemoryJobStore::new()),
            entries: Arc::new(MemoryEntryStore::new()),
            objects: Arc::new(MemoryObjectStore::new("http://localhost/files")),
        };
        let engine = ImportEngine::new(
            Stores {
                jobs: stores.jobs.clone(),
                entries: stores.entries.clone(),
                objects: stores.objects.clone(),
            },
            &self.config.import,
        );

        let state = AppState {
            pool: None,
            config: Arc::new(self.config.clone()),
            imports: Arc::new(engine),
            admission: Arc::new(AdmissionController::new(
                self.counters,
                self.config.rate_limit.policy,
            )),
            generator: self.generator,
        };

        (build_app_router(state, &self.config), stores)
    }
}

pub fn build_test_app() -> (Router, TestStores) {
    TestAppBuilder::new().build()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_empty(app: &Router, uri: &str) -> Response {
    send(app, Request::post(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
    send(
        app,
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// Build a `multipart/form-data` upload of `(filename, contents)` pairs.
pub fn multipart_upload(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, contents) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {contents}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::post(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn expect_json(response: Response, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}
