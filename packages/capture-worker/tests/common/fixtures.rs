//! Worker fixtures backed by the in-memory store and mock dependencies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use capture_core::config::{CaptureConfig, EngineOptions};
use capture_core::domains::captures::{Capture, CaptureWorker};
use capture_core::kernel::{
    BaseCaptureStore, BasePortProbe, BaseWebhookNotifier, MemoryCaptureStore, MockPortProbe,
    MockWebhookNotifier, WorkerDeps,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use super::engine::{recorded_engine_args, FakeEngine};

pub const TEST_PORT: u16 = 9000;

type StoreWrapper = Box<dyn FnOnce(Arc<MemoryCaptureStore>) -> Arc<dyn BaseCaptureStore>>;
type ConfigEdit = Box<dyn FnOnce(&mut CaptureConfig)>;

/// A worker wired to fakes, plus handles to inspect them.
pub struct TestWorker {
    pub worker: CaptureWorker,
    pub store: Arc<MemoryCaptureStore>,
    pub probe: MockPortProbe,
    pub webhook: MockWebhookNotifier,
    pub workdir: TempDir,
}

pub struct TestWorkerBuilder {
    engine: FakeEngine,
    store: Arc<MemoryCaptureStore>,
    probe: MockPortProbe,
    webhook: MockWebhookNotifier,
    port_probe_override: Option<Arc<dyn BasePortProbe>>,
    webhook_override: Option<Arc<dyn BaseWebhookNotifier>>,
    store_wrapper: Option<StoreWrapper>,
    config_edits: Vec<ConfigEdit>,
}

impl TestWorker {
    pub fn builder(engine: FakeEngine) -> TestWorkerBuilder {
        TestWorkerBuilder {
            engine,
            store: Arc::new(MemoryCaptureStore::new()),
            probe: MockPortProbe::new(),
            webhook: MockWebhookNotifier::new(),
            port_probe_override: None,
            webhook_override: None,
            store_wrapper: None,
            config_edits: Vec::new(),
        }
    }

    pub fn new(engine: FakeEngine) -> Self {
        Self::builder(engine).build()
    }

    /// Insert a pending capture.
    pub async fn seed(&self, url: &str, callback_url: Option<&str>) -> Capture {
        let capture = Capture::new(url, callback_url.map(str::to_string));
        self.store.insert(&capture).await.expect("seed capture");
        capture
    }

    pub async fn reload(&self, capture: &Capture) -> Capture {
        self.store
            .find_by_id(capture.id_capture)
            .await
            .expect("capture exists")
    }

    pub fn storage_path(&self) -> PathBuf {
        self.worker.config().temporary_storage_path.clone()
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.worker.config().deployment_sentinel_path.clone()
    }

    pub fn engine_args(&self) -> Vec<String> {
        recorded_engine_args(self.workdir.path())
    }
}

impl TestWorkerBuilder {
    /// Share a store between several workers.
    pub fn store(mut self, store: Arc<MemoryCaptureStore>) -> Self {
        self.store = store;
        self
    }

    /// Put another store implementation in front of the in-memory one.
    pub fn wrap_store<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Arc<MemoryCaptureStore>) -> Arc<dyn BaseCaptureStore> + 'static,
    {
        self.store_wrapper = Some(Box::new(wrap));
        self
    }

    pub fn probe(mut self, probe: MockPortProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn port_probe(mut self, probe: Arc<dyn BasePortProbe>) -> Self {
        self.port_probe_override = Some(probe);
        self
    }

    pub fn webhook(mut self, webhook: MockWebhookNotifier) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn webhook_notifier(mut self, notifier: Arc<dyn BaseWebhookNotifier>) -> Self {
        self.webhook_override = Some(notifier);
        self
    }

    pub fn configure<F>(mut self, edit: F) -> Self
    where
        F: FnOnce(&mut CaptureConfig) + 'static,
    {
        self.config_edits.push(Box::new(edit));
        self
    }

    /// Soft timeout in milliseconds; the fuse is zero in tests.
    pub fn capture_timeout_ms(self, millis: u64) -> Self {
        self.configure(move |config| {
            config
                .engine_options
                .set(EngineOptions::CAPTURE_TIMEOUT_FLAG, millis);
        })
    }

    pub fn build(self) -> TestWorker {
        let workdir = tempfile::tempdir().expect("create workdir");
        let script = self.engine.install(workdir.path());

        let mut engine_options = EngineOptions::empty();
        engine_options.set(EngineOptions::CAPTURE_TIMEOUT_FLAG, 10_000);

        let mut config = CaptureConfig {
            temporary_storage_path: workdir.path().join("storage"),
            deployment_sentinel_path: workdir.path().join("stop"),
            engine_command: vec!["sh".to_string(), script.to_string_lossy().into_owned()],
            engine_options,
            timeout_fuse: Duration::ZERO,
            termination_grace: Duration::from_millis(500),
            proxy_port: TEST_PORT,
            poll_interval: Duration::from_millis(20),
            ..CaptureConfig::default()
        };
        for edit in self.config_edits {
            edit(&mut config);
        }

        let store: Arc<dyn BaseCaptureStore> = match self.store_wrapper {
            Some(wrap) => wrap(self.store.clone()),
            None => self.store.clone(),
        };
        let port_probe = self
            .port_probe_override
            .unwrap_or_else(|| Arc::new(self.probe.clone()) as Arc<dyn BasePortProbe>);
        let webhook = self
            .webhook_override
            .unwrap_or_else(|| Arc::new(self.webhook.clone()) as Arc<dyn BaseWebhookNotifier>);

        let worker = CaptureWorker::new(config, WorkerDeps::new(store, port_probe, webhook));

        TestWorker {
            worker,
            store: self.store,
            probe: self.probe,
            webhook: self.webhook,
            workdir,
        }
    }
}

// =============================================================================
// Webhook receiver
// =============================================================================

pub type ReceivedHooks = Arc<Mutex<Vec<serde_json::Value>>>;

/// Start an HTTP server that records every JSON body POSTed to `/hook`.
pub async fn spawn_webhook_receiver() -> (String, ReceivedHooks) {
    let received: ReceivedHooks = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/hook",
            post(
                |State(received): State<ReceivedHooks>, Json(body): Json<serde_json::Value>| async move {
                    received.lock().await.push(body);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(received.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind receiver");
    let addr = listener.local_addr().expect("receiver address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}/hook"), received)
}

/// Accept connections on a local port and never answer them.
pub async fn spawn_silent_listener() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let port = listener.local_addr().expect("listener address").port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    port
}
