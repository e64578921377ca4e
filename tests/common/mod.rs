//! Common test utilities for integration tests.

pub mod fixtures;

use async_trait::async_trait;
use edgefetch::config::ReportingConfig;
use edgefetch::locator::LocatorClient;
use edgefetch::reporter::{OutcomeReporter, ReportEvent};
use edgefetch::signer::{KeyPair, Signer};
use edgefetch::transport::{BlockTransport, EdgeRequest};
use edgefetch::{ContentId, DownloadReport, EdgeDescriptor, FetchError, RetrievalSession};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use fixtures::*;

/// Locator stub that counts resolutions and records reports.
pub struct StubLocator {
    response: std::result::Result<Vec<EdgeDescriptor>, FetchError>,
    delay: Mutex<Option<Duration>>,
    resolve_calls: AtomicUsize,
    resolved_cids: Mutex<Vec<String>>,
    reports: Mutex<Vec<DownloadReport>>,
}

impl StubLocator {
    pub fn with_edges(descriptors: Vec<EdgeDescriptor>) -> Self {
        Self::with_response(Ok(descriptors))
    }

    pub fn failing(error: FetchError) -> Self {
        Self::with_response(Err(error))
    }

    fn with_response(response: std::result::Result<Vec<EdgeDescriptor>, FetchError>) -> Self {
        Self {
            response,
            delay: Mutex::new(None),
            resolve_calls: AtomicUsize::new(0),
            resolved_cids: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Delay every resolution by `delay` (or stop delaying with `None`).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn resolved_cids(&self) -> Vec<String> {
        self.resolved_cids.lock().clone()
    }

    pub fn reports(&self) -> Vec<DownloadReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl LocatorClient for StubLocator {
    async fn resolve_edges(
        &self,
        cid: &ContentId,
        public_key_pem: &str,
    ) -> edgefetch::Result<Vec<EdgeDescriptor>> {
        assert!(public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.resolved_cids.lock().push(cid.to_string());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }

    async fn report_outcome(&self, reports: &[DownloadReport]) -> edgefetch::Result<()> {
        self.reports.lock().extend_from_slice(reports);
        Ok(())
    }
}

/// Transport stub scripted per content id.
///
/// Edge requests for unscripted ids miss with `EdgeNotFound`; gateway requests
/// for unscripted ids fail with `Gateway`.
#[derive(Default)]
pub struct StubTransport {
    edge: Mutex<HashMap<String, std::result::Result<Vec<u8>, FetchError>>>,
    gateway: Mutex<HashMap<String, Vec<u8>>>,
    edge_delay: Mutex<Option<Duration>>,
    edge_requests: Mutex<Vec<String>>,
    gateway_requests: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve_edge(&self, cid: &str, data: &[u8]) {
        self.edge.lock().insert(cid.to_string(), Ok(data.to_vec()));
    }

    pub fn fail_edge(&self, cid: &str, error: FetchError) {
        self.edge.lock().insert(cid.to_string(), Err(error));
    }

    pub fn serve_gateway(&self, cid: &str, data: &[u8]) {
        self.gateway.lock().insert(cid.to_string(), data.to_vec());
    }

    pub fn set_edge_delay(&self, delay: Option<Duration>) {
        *self.edge_delay.lock() = delay;
    }

    pub fn edge_requests(&self) -> Vec<String> {
        self.edge_requests.lock().clone()
    }

    pub fn gateway_requests(&self) -> Vec<String> {
        self.gateway_requests.lock().clone()
    }
}

/// Extract the `cid` query parameter from an edge request target.
fn query_cid(target: &str) -> String {
    target
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix("cid="))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl BlockTransport for StubTransport {
    async fn fetch_edge(&self, request: &EdgeRequest) -> edgefetch::Result<Vec<u8>> {
        self.edge_requests.lock().push(request.target().to_string());

        let delay = *self.edge_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let cid = query_cid(request.target());
        let scripted = self.edge.lock().get(&cid).cloned();
        scripted.unwrap_or_else(|| Err(FetchError::EdgeNotFound(format!("{} not cached", cid))))
    }

    async fn fetch_gateway(&self, url: &str) -> edgefetch::Result<Vec<u8>> {
        self.gateway_requests.lock().push(url.to_string());
        let gateway = self.gateway.lock();
        gateway
            .iter()
            .find(|(cid, _)| url.ends_with(cid.as_str()))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| FetchError::Gateway(format!("{} returned 404 Not Found", url)))
    }
}

/// Reporting settings suitable for tests.
pub fn reporting_config() -> ReportingConfig {
    ReportingConfig {
        enabled: true,
        queue_capacity: 64,
        workers: 2,
        timeout: Duration::from_secs(5),
    }
}

/// Everything needed to drive a session against stubs.
pub struct Harness {
    pub locator: Arc<StubLocator>,
    pub transport: Arc<StubTransport>,
    pub signer: Arc<KeyPair>,
    pub reporter: Arc<OutcomeReporter>,
}

impl Harness {
    pub fn new(locator: StubLocator) -> Self {
        let locator = Arc::new(locator);
        let signer = Arc::new(KeyPair::generate().expect("keypair"));
        let reporter = Arc::new(OutcomeReporter::new(
            locator.clone(),
            signer.clone(),
            &reporting_config(),
        ));

        Self {
            locator,
            transport: Arc::new(StubTransport::new()),
            signer,
            reporter,
        }
    }

    pub fn session(&self) -> RetrievalSession {
        let signer: Arc<dyn Signer> = self.signer.clone();
        RetrievalSession::new(
            self.locator.clone(),
            self.transport.clone(),
            signer,
            self.reporter.clone(),
        )
        .with_seed(7)
    }

    /// Wait for the next report event, failing the test after a few seconds.
    pub async fn next_report(events: &mut tokio::sync::broadcast::Receiver<ReportEvent>) -> ReportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("report event timed out")
            .expect("report channel closed")
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Drain a receiver to completion, failing if it stays open too long.
pub async fn collect<T>(mut rx: tokio::sync::mpsc::Receiver<T>, timeout: Duration) -> Vec<T> {
    tokio::time::timeout(timeout, async move {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    })
    .await
    .expect("stream did not close in time")
}
