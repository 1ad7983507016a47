#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use reqwest::Client;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use tokio::sync::{Notify, watch};
use uuid::Uuid;

use qdsync::api::{Deliver, DeliveryError};
use qdsync::config::{BackgroundConfig, Config};
use qdsync::db;
use qdsync::models::{Downtime, DowntimeSubmission};
use qdsync::state::SharedState;
use qdsync::submission::parser::{UploadedFile, parse_multipart};

// ── Store ───────────────────────────────────────────────────────

/// A throwaway SQLite file with migrations applied.
pub struct TestDb {
    pub pool: SqlitePool,
    pub path: PathBuf,
}

impl TestDb {
    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }

    /// Close the pool and open the same file again, as a restarted process would.
    pub async fn reopen(&mut self) {
        self.pool.close().await;
        self.pool = db::connect(&self.url()).await.expect("reopen failed");
    }
}

pub async fn test_db() -> TestDb {
    let path = std::env::temp_dir().join(format!("qdsync_test_{}.db", Uuid::now_v7().simple()));
    let url = format!("sqlite://{}?mode=rwc", path.display());

    let pool = db::connect(&url).await.expect("Failed to open test database");
    db::migrate(&pool).await.expect("Failed to run migrations on test database");

    TestDb { pool, path }
}

pub async fn cleanup_db(db: TestDb) {
    db.pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db.path.clone().into_os_string();
        name.push(suffix);
        let _ = std::fs::remove_file(name);
    }
}

/// Make every outbox query fail from now on.
pub async fn break_store(pool: &SqlitePool) {
    sqlx::query("DROP TABLE outbox")
        .execute(pool)
        .await
        .expect("Failed to drop outbox table");
}

pub fn submission(machine_id: &str) -> DowntimeSubmission {
    DowntimeSubmission::from_value(json!({
        "machine_id": machine_id,
        "reason": "Jam",
        "category": "Feeder",
        "description": format!("stopped {machine_id}"),
    }))
    .unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn pending_ids(pool: &SqlitePool) -> Vec<String> {
    db::outbox::list_pending(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.machine_id)
        .collect()
}

// ── In-process collaborator ─────────────────────────────────────

/// Records every delivery; fails for configured machine ids.
#[derive(Default)]
pub struct RecordingDeliverer {
    calls: Mutex<Vec<(String, Option<String>)>>,
    failing: Mutex<HashMap<String, DeliveryError>>,
    blocking: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl RecordingDeliverer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delivery parks until `release` is notified.
    pub fn blocking() -> Arc<Self> {
        let deliverer = Self::default();
        deliverer.blocking.store(true, Ordering::SeqCst);
        Arc::new(deliverer)
    }

    pub fn fail(&self, machine_id: &str, status: u16) {
        self.failing.lock().unwrap().insert(
            machine_id.to_string(),
            DeliveryError::Rejected {
                status,
                body: "rejected".to_string(),
            },
        );
    }

    pub fn fail_network(&self, machine_id: &str) {
        self.failing.lock().unwrap().insert(
            machine_id.to_string(),
            DeliveryError::Network("connection refused".to_string()),
        );
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn tokens(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Deliver for RecordingDeliverer {
    async fn deliver(&self, downtime: &Downtime, token: Option<&str>) -> Result<(), DeliveryError> {
        self.calls
            .lock()
            .unwrap()
            .push((downtime.machine_id.clone(), token.map(str::to_string)));

        if self.blocking.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        match self.failing.lock().unwrap().get(&downtime.machine_id) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

// ── HTTP collaborator ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReceivedReport {
    pub fields: Map<String, Value>,
    pub files: HashMap<String, UploadedFile>,
    pub authorization: Option<String>,
}

impl ReceivedReport {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

#[derive(Default)]
struct MockState {
    received: Mutex<Vec<ReceivedReport>>,
    status: Mutex<Option<u16>>,
}

/// A stand-in for the remote logging endpoint on a random port.
pub struct MockCollaborator {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockCollaborator {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/api/operator/log", axum::routing::post(receive))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock collaborator");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock collaborator failed");
        });

        Self { addr, state }
    }

    pub fn log_url(&self) -> String {
        format!("http://{}/api/operator/log", self.addr)
    }

    /// Answer every request with `status` from now on.
    pub fn respond_with(&self, status: u16) {
        *self.state.status.lock().unwrap() = Some(status);
    }

    pub fn received(&self) -> Vec<ReceivedReport> {
        self.state.received.lock().unwrap().clone()
    }
}

async fn receive(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let form = match parse_multipart(&headers, body).await {
        Ok(form) => form,
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, e),
    };

    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state.received.lock().unwrap().push(ReceivedReport {
        fields: form.fields,
        files: form.files,
        authorization,
    });

    let status = state.status.lock().unwrap().unwrap_or(201);
    let status = StatusCode::from_u16(status).unwrap();
    (status, "{}".to_string())
}

// ── Agent ───────────────────────────────────────────────────────

/// A running agent on a random port, backed by its own database.
pub struct TestAgent {
    pub addr: SocketAddr,
    pub client: Client,
    pub db: TestDb,
    pub state: SharedState,
    shutdown: watch::Sender<bool>,
    app: Option<qdsync::App>,
}

impl TestAgent {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn delete(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn set_online(&self, online: bool) {
        let (_, status) = self
            .post_json("/api/connectivity", &json!({ "online": online }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    pub async fn login(&self, token: &str) {
        let (_, status) = self
            .put_json("/api/session", &json!({ "token": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    pub async fn pending(&self) -> usize {
        db::outbox::count(&self.db.pool).await.unwrap() as usize
    }
}

pub fn test_config(db_url: String) -> Config {
    Config {
        api_base: "http://127.0.0.1:9".to_string(),
        log_endpoint: "/api/operator/log".to_string(),
        database_url: db_url,
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        sync_interval: Duration::from_secs(3600),
        probe: None,
        token_timeout: Duration::from_millis(300),
        background: BackgroundConfig {
            grant_delay: Duration::from_millis(50),
            window: Duration::from_secs(5),
            backoff_max: Duration::from_millis(500),
            ..BackgroundConfig::default()
        },
        request_timeout: Duration::from_secs(5),
        max_body_size: 1_048_576,
        initial_token: None,
        log_level: "warn".to_string(),
    }
}

/// Spawn an agent delivering through `api`, with a fresh database.
pub async fn spawn_agent(api: Arc<dyn Deliver>) -> TestAgent {
    spawn_agent_with(api, |_| {}).await
}

pub async fn spawn_agent_with(api: Arc<dyn Deliver>, configure: impl FnOnce(&mut Config)) -> TestAgent {
    let db = test_db().await;
    let mut config = test_config(db.url());
    configure(&mut config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = qdsync::build_app(db.pool.clone(), config, api, shutdown_rx);
    let router = app.router.clone();
    let state = Arc::clone(&app.state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    TestAgent {
        addr,
        client: Client::new(),
        db,
        state,
        shutdown: shutdown_tx,
        app: Some(app),
    }
}

/// Stop background tasks and remove the database files.
pub async fn cleanup(mut agent: TestAgent) {
    agent.shutdown.send_replace(true);
    if let Some(app) = agent.app.take() {
        app.join().await;
    }
    cleanup_db(agent.db).await;
}
