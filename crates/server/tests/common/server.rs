//! Server test utilities.

use crate::common::executor::MockExecutor;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use csvgate_core::config::AppConfig;
use csvgate_query::{DuckDbExecutor, QueryExecutor};
use csvgate_server::{AppState, create_router};
use csvgate_storage::ArtifactStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tower::ServiceExt;

/// Expected CSV export of the `test` table created by `seed_duckdb`.
#[allow(dead_code)]
pub const TEST_TABLE_CSV: &str = "id,label\n1,alpha\n2,beta\n";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub executor: Arc<MockExecutor>,
    _temp_dir: TempDir,
}

/// Response pieces returned by `TestServer::get`.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server backed by a mock executor.
    pub async fn new() -> Self {
        Self::with_config(MockExecutor::new(), |_| {}).await
    }

    /// Create a test server with a custom mock and config modifications.
    pub async fn with_config<F>(executor: MockExecutor, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let executor = Arc::new(executor);
        let (router, state) =
            build(temp_dir.path(), executor.clone() as Arc<dyn QueryExecutor>, modifier).await;

        Self {
            router,
            state,
            executor,
            _temp_dir: temp_dir,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.state.config.cache.dir
    }

    /// Write an artifact directly into the cache, `age` old.
    pub fn seed_artifact(&self, relative: &str, contents: &str, age: Duration) -> PathBuf {
        seed_artifact(self.cache_dir(), relative, contents, age)
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        get(&self.router, uri).await
    }

    /// Wait until no regeneration is in flight.
    pub async fn wait_idle(&self) {
        wait_idle(&self.state).await
    }
}

/// A test server backed by the real DuckDB executor and a seeded `local.db`.
#[allow(dead_code)]
pub struct DuckDbTestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl DuckDbTestServer {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        seed_duckdb(&temp_dir.path().join("local.db"));

        let config = AppConfig::for_testing(temp_dir.path());
        let executor: Arc<dyn QueryExecutor> = Arc::new(DuckDbExecutor::new(&config.database));
        let (router, state) = build(temp_dir.path(), executor, |_| {}).await;

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        get(&self.router, uri).await
    }
}

async fn build<F>(
    dir: &Path,
    executor: Arc<dyn QueryExecutor>,
    modifier: F,
) -> (axum::Router, AppState)
where
    F: FnOnce(&mut AppConfig),
{
    let mut config = AppConfig::for_testing(dir);
    modifier(&mut config);

    let store = ArtifactStore::new(&config.cache.dir)
        .await
        .expect("Failed to create artifact store");
    csvgate_server::metrics::register_metrics();

    let state = AppState::new(config, store, executor);
    let router = create_router(state.clone());
    (router, state)
}

/// Create a DuckDB file with a `test` table. Named `local.db`, its catalog is `local`.
pub fn seed_duckdb(path: &Path) {
    let conn = duckdb::Connection::open(path).expect("Failed to create database");
    conn.execute_batch(
        "CREATE TABLE test (id INTEGER, label VARCHAR);
         INSERT INTO test VALUES (1, 'alpha'), (2, 'beta');",
    )
    .expect("Failed to seed database");
}

/// Write an artifact under `cache_dir`, `age` old.
pub fn seed_artifact(cache_dir: &Path, relative: &str, contents: &str, age: Duration) -> PathBuf {
    let path = cache_dir.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
    path
}

/// Issue a GET and collect the whole response.
pub async fn get(router: &axum::Router, uri: &str) -> TestResponse {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Poll until the lease table is empty.
pub async fn wait_idle(state: &AppState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.coordinator.in_flight_count() > 0 {
        if tokio::time::Instant::now() > deadline {
            panic!("regeneration did not finish in time");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Every file under `dir`, recursively.
#[allow(dead_code)]
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}
