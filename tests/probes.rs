//! End-to-end probe tests against a real listener.
//!
//! Each test binds 127.0.0.1:0, runs the full application with a scripted
//! worker and talks to it over HTTP with reqwest.
//!
//! Run with: cargo test --test probes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use vigil::app::run_with_listener;
use vigil::config::AppConfig;
use vigil::supervisor::{Heartbeat, Worker, WorkerError};
use vigil::AppError;

/// Worker that counts ticks, optionally failing during init
struct CountingWorker {
    ticks: Arc<AtomicU64>,
    fail_init: bool,
}

#[async_trait]
impl Worker for CountingWorker {
    fn name(&self) -> &str {
        "counting"
    }

    async fn init(&mut self) -> Result<(), WorkerError> {
        if self.fail_init {
            return Err(WorkerError::Init("upstream credentials missing".into()));
        }
        Ok(())
    }

    async fn tick(&mut self, _heartbeat: &Heartbeat) -> Result<(), WorkerError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Running application under test
struct TestApp {
    base_url: String,
    client: reqwest::Client,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), AppError>>,
}

impl TestApp {
    async fn spawn(worker: CountingWorker) -> Self {
        let mut config = AppConfig::default();
        config.worker.tick_interval_seconds = 1;
        config.worker.stale_after_seconds = 10;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(run_with_listener(config, listener, worker, async move {
            let _ = stopped.await;
        }));

        Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            stop: Some(stop),
            handle,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    /// Poll `path` until it returns `status` or the deadline passes.
    async fn wait_for_status(&self, path: &str, status: u16, within: Duration) -> reqwest::Response {
        let deadline = Instant::now() + within;
        loop {
            let response = self.get(path).await;
            if response.status().as_u16() == status {
                return response;
            }
            assert!(
                Instant::now() < deadline,
                "{} did not return {} within {:?}",
                path,
                status,
                within
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("application did not shut down")
            .unwrap();
        assert!(result.is_ok(), "application returned {:?}", result.err());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn health_answers_within_two_seconds() {
    let started = Instant::now();
    let app = TestApp::spawn(CountingWorker {
        ticks: Arc::default(),
        fail_init: false,
    })
    .await;

    let response = app
        .wait_for_status("/health", 200, Duration::from_secs(2))
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.text().await.unwrap(), "ok");

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ready_once_worker_is_running() {
    let app = TestApp::spawn(CountingWorker {
        ticks: Arc::default(),
        fail_init: false,
    })
    .await;

    let response = app
        .wait_for_status("/ready", 200, Duration::from_secs(2))
        .await;
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["ready"], true);
    assert_eq!(report["worker"]["state"], "running");
    assert_eq!(report["worker"]["worker"], "counting");

    let response = app.get("/healthz").await;
    assert_eq!(response.status().as_u16(), 200);

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_startup_fails_ready_but_not_health() {
    let app = TestApp::spawn(CountingWorker {
        ticks: Arc::default(),
        fail_init: true,
    })
    .await;

    let response = app
        .wait_for_status("/healthz", 503, Duration::from_secs(2))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");

    let response = app.get("/ready").await;
    assert_eq!(response.status().as_u16(), 503);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["worker"]["state"], "failed");
    assert_eq!(
        report["worker"]["last_error"],
        "worker initialization failed: upstream credentials missing"
    );

    let response = app.get("/health").await;
    assert_eq!(response.status().as_u16(), 200);

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_health_requests_do_not_disturb_worker() {
    let ticks = Arc::new(AtomicU64::new(0));
    let app = TestApp::spawn(CountingWorker {
        ticks: ticks.clone(),
        fail_init: false,
    })
    .await;
    app.wait_for_status("/ready", 200, Duration::from_secs(2))
        .await;

    let requests = (0..100).map(|_| {
        let client = app.client.clone();
        let url = format!("{}/health", app.base_url);
        async move { client.get(url).send().await.map(|r| r.status().as_u16()) }
    });
    let statuses = futures::future::join_all(requests).await;
    assert_eq!(statuses.len(), 100);
    for status in statuses {
        assert_eq!(status.unwrap(), 200);
    }

    // The loop keeps ticking on schedule while probes are served
    let before = ticks.load(Ordering::SeqCst);
    let deadline = Instant::now() + Duration::from_secs(5);
    while ticks.load(Ordering::SeqCst) <= before {
        assert!(Instant::now() < deadline, "worker stopped ticking");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let report: Value = app.get("/status").await.json().await.unwrap();
    assert_eq!(report["worker"]["state"], "running");
    assert!(report["worker"]["iterations"].as_u64().unwrap() >= 1);

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bind_failure_is_reported_before_worker_starts() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = AppConfig::default();
    config.http.host = "127.0.0.1".to_string();
    config.http.port = taken.local_addr().unwrap().port();

    let ticks = Arc::new(AtomicU64::new(0));
    let result = vigil::app::run(
        config,
        CountingWorker {
            ticks: ticks.clone(),
            fail_init: false,
        },
    )
    .await;

    assert!(matches!(result, Err(AppError::Server(_))));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), 0);
}
