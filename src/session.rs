//! Retrieval session: pool resolution, edge selection and signed fetch.
//!
//! A session serves one edge pool. The pool is resolved from the locator at
//! most once, against the session's root content id (the one set with
//! [`RetrievalSession::with_root`], otherwise the root named by the first
//! request, which for `get_block` is the requested id itself), and
//! every later block request reuses the root's capabilities.
//!
//! Resolution failures are sticky: once the locator call has failed, every
//! later request returns the same error without contacting the locator again.
//!
//! ```text
//! Unresolved ──► Resolving ──┬──► Resolved { edges }
//!                            └──► StickyFailed(error)
//! ```
//!
//! After each edge attempt an outcome report is queued on the
//! [`OutcomeReporter`], except when the edge does not hold the content or the
//! caller cancelled.

use crate::chooser::WeightedChooser;
use crate::config::ClientConfig;
use crate::error::{ErrorKind, FetchError, Result};
use crate::locator::{HttpLocatorClient, LocatorClient};
use crate::observability;
use crate::reporter::OutcomeReporter;
use crate::signer::Signer;
use crate::transport::{BlockTransport, EdgeRequest, HttpTransport};
use crate::types::{ContentId, EdgeDescriptor};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use crate::config::SelectionStrategy;

/// Observable state of a session's edge pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolState {
    Unresolved,
    Resolving,
    Resolved { edges: usize },
    /// Resolution failed; the error is returned to every later request.
    StickyFailed(FetchError),
}

enum Selection {
    Single,
    Uniform,
    Weighted(WeightedChooser<usize>),
    /// Weighted selection was required but the weights cannot be sampled.
    Invalid(FetchError),
}

struct ResolvedPool {
    descriptors: Vec<EdgeDescriptor>,
    selection: Selection,
}

impl ResolvedPool {
    fn new(descriptors: Vec<EdgeDescriptor>, strategy: SelectionStrategy) -> Self {
        let selection = if descriptors.len() == 1 {
            Selection::Single
        } else {
            match strategy {
                SelectionStrategy::Uniform => Selection::Uniform,
                SelectionStrategy::Weighted if descriptors.iter().any(|d| d.weight != 0) => {
                    let weights = descriptors.iter().enumerate().map(|(i, d)| (i, d.weight));
                    match WeightedChooser::new(weights) {
                        Ok(chooser) => Selection::Weighted(chooser),
                        Err(e) => Selection::Invalid(e),
                    }
                }
                SelectionStrategy::Weighted => Selection::Uniform,
            }
        };

        Self {
            descriptors,
            selection,
        }
    }
}

struct ResolvingFlag<'a>(&'a AtomicBool);

impl<'a> ResolvingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ResolvingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Block retrieval against one resolved edge pool.
pub struct RetrievalSession {
    locator: Arc<dyn LocatorClient>,
    transport: Arc<dyn BlockTransport>,
    signer: Arc<dyn Signer>,
    reporter: Arc<OutcomeReporter>,
    strategy: SelectionStrategy,
    rng: Mutex<StdRng>,
    root: Option<ContentId>,
    pool: OnceCell<Result<Arc<ResolvedPool>>>,
    resolving: AtomicBool,
}

impl RetrievalSession {
    /// Create a session with weighted selection and an entropy-seeded generator.
    pub fn new(
        locator: Arc<dyn LocatorClient>,
        transport: Arc<dyn BlockTransport>,
        signer: Arc<dyn Signer>,
        reporter: Arc<OutcomeReporter>,
    ) -> Self {
        Self {
            locator,
            transport,
            signer,
            reporter,
            strategy: SelectionStrategy::default(),
            rng: Mutex::new(StdRng::from_entropy()),
            root: None,
            pool: OnceCell::new(),
            resolving: AtomicBool::new(false),
        }
    }

    /// Build the HTTP locator, transport and reporter from configuration.
    ///
    /// Must be called within a Tokio runtime since the reporter starts its
    /// workers immediately.
    pub fn from_config(config: &ClientConfig, signer: Arc<dyn Signer>) -> Self {
        let locator: Arc<dyn LocatorClient> = Arc::new(HttpLocatorClient::from_config(config));
        let transport: Arc<dyn BlockTransport> = Arc::new(HttpTransport::from_config(config));
        let reporter = Arc::new(OutcomeReporter::new(
            Arc::clone(&locator),
            Arc::clone(&signer),
            &config.reporting,
        ));

        let session = Self::new(locator, transport, signer, reporter)
            .with_strategy(config.selection.strategy);
        match config.selection.seed {
            Some(seed) => session.with_seed(seed),
            None => session,
        }
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Seed the selection generator for reproducible picks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Resolve the pool against `root` instead of the first requested id.
    pub fn with_root(mut self, root: ContentId) -> Self {
        self.root = Some(root);
        self
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn reporter(&self) -> &Arc<OutcomeReporter> {
        &self.reporter
    }

    pub fn pool_state(&self) -> PoolState {
        match self.pool.get() {
            Some(Ok(pool)) => PoolState::Resolved {
                edges: pool.descriptors.len(),
            },
            Some(Err(e)) => PoolState::StickyFailed(e.clone()),
            None if self.resolving.load(Ordering::SeqCst) => PoolState::Resolving,
            None => PoolState::Unresolved,
        }
    }

    /// Fetch the raw bytes of `cid` from one edge.
    pub async fn get_block(&self, cid: &ContentId) -> Result<Vec<u8>> {
        self.get_block_with_cancel(cid, &CancellationToken::new()).await
    }

    /// Fetch the raw bytes of `cid`, abandoning the network calls if `cancel` fires.
    pub async fn get_block_with_cancel(
        &self,
        cid: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.get_block_under_root(cid, cid, cancel).await
    }

    /// Fetch `cid`, resolving an unresolved pool against `root`.
    ///
    /// A root set with [`RetrievalSession::with_root`] takes precedence, and
    /// an already resolved (or failed) pool is reused as is.
    pub async fn get_block_under_root(
        &self,
        cid: &ContentId,
        root: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let _timer = observability::edge_fetch_timer(match self.strategy {
            SelectionStrategy::Weighted => "weighted",
            SelectionStrategy::Uniform => "uniform",
        });

        let pool = self.pool(root, cancel).await?;
        let descriptor = self.select(&pool)?;

        let request = match EdgeRequest::build(descriptor, cid) {
            Ok(request) => request,
            Err(e) => return Err(self.settle_failure(cid, descriptor.serial_number, e)),
        };

        debug!(cid = %cid, sn = descriptor.serial_number, url = %descriptor.url, "Fetching from edge");

        let started = std::time::Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.transport.fetch_edge(&request) => result,
        };

        match result {
            Ok(data) => {
                observability::record_edge_fetch("success", data.len());
                observability::histograms::record_edge_latency("success", started.elapsed());
                self.reporter.submit(cid, descriptor.serial_number, true);
                Ok(data)
            }
            Err(e) => {
                observability::histograms::record_edge_latency("failure", started.elapsed());
                Err(self.settle_failure(cid, descriptor.serial_number, e))
            }
        }
    }

    /// Log, count and report a failed edge attempt according to its kind.
    fn settle_failure(&self, cid: &ContentId, serial_number: i64, error: FetchError) -> FetchError {
        match error.kind() {
            ErrorKind::NotFound => {
                debug!(cid = %cid, sn = serial_number, error = %error, "Edge does not hold content");
                observability::record_edge_fetch("not_found", 0);
            }
            ErrorKind::Cancelled => {
                debug!(cid = %cid, sn = serial_number, "Edge fetch cancelled");
                observability::record_edge_fetch("cancelled", 0);
            }
            _ => {
                warn!(cid = %cid, sn = serial_number, error = %error, "Edge fetch failed");
                observability::record_edge_fetch("failure", 0);
                self.reporter.submit(cid, serial_number, false);
            }
        }
        error
    }

    async fn pool(&self, root: &ContentId, cancel: &CancellationToken) -> Result<Arc<ResolvedPool>> {
        let root = self.root.as_ref().unwrap_or(root);
        let init = self.pool.get_or_init(|| self.resolve(root.clone()));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            outcome = init => outcome.clone(),
        }
    }

    async fn resolve(&self, root: ContentId) -> Result<Arc<ResolvedPool>> {
        let _flag = ResolvingFlag::raise(&self.resolving);
        let _timer = observability::resolution_timer();

        let public_key_pem = self.signer.public_key_pem();
        let outcome = match self.locator.resolve_edges(&root, &public_key_pem).await {
            Ok(descriptors) if descriptors.is_empty() => Err(FetchError::NotCached(root.to_string())),
            Ok(descriptors) => Ok(descriptors),
            Err(e) if e.kind() == ErrorKind::Resolution => Err(e),
            Err(e) => Err(FetchError::Resolution {
                cid: root.to_string(),
                reason: e.to_string(),
            }),
        };

        match outcome {
            Ok(descriptors) => {
                info!(cid = %root, edges = descriptors.len(), "Edge pool resolved");
                observability::record_resolution(true);
                Ok(Arc::new(ResolvedPool::new(descriptors, self.strategy)))
            }
            Err(e) => {
                warn!(cid = %root, error = %e, "Edge pool resolution failed");
                observability::record_resolution(false);
                Err(e)
            }
        }
    }

    fn select<'a>(&self, pool: &'a ResolvedPool) -> Result<&'a EdgeDescriptor> {
        let index = match &pool.selection {
            Selection::Single => 0,
            Selection::Uniform => self.rng.lock().gen_range(0..pool.descriptors.len()),
            Selection::Weighted(chooser) => *chooser.pick(&mut *self.rng.lock()),
            Selection::Invalid(e) => return Err(e.clone()),
        };
        Ok(&pool.descriptors[index])
    }
}

impl std::fmt::Debug for RetrievalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalSession")
            .field("strategy", &self.strategy)
            .field("root", &self.root)
            .field("pool", &self.pool_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::KeyPair;
    use crate::types::DownloadReport;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    struct FixedLocator {
        descriptors: Vec<EdgeDescriptor>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocatorClient for FixedLocator {
        async fn resolve_edges(&self, _cid: &ContentId, _pem: &str) -> Result<Vec<EdgeDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.descriptors.clone())
        }

        async fn report_outcome(&self, _reports: &[DownloadReport]) -> Result<()> {
            Ok(())
        }
    }

    /// Echoes the serial number of the edge it was asked to hit.
    struct EchoTransport;

    #[async_trait]
    impl BlockTransport for EchoTransport {
        async fn fetch_edge(&self, request: &EdgeRequest) -> Result<Vec<u8>> {
            Ok(request.serial_number().to_string().into_bytes())
        }

        async fn fetch_gateway(&self, _url: &str) -> Result<Vec<u8>> {
            Err(FetchError::Gateway("unused".into()))
        }
    }

    fn session(descriptors: Vec<EdgeDescriptor>) -> RetrievalSession {
        let locator = Arc::new(FixedLocator {
            descriptors,
            calls: AtomicUsize::new(0),
        });
        RetrievalSession::new(
            locator,
            Arc::new(EchoTransport),
            Arc::new(KeyPair::generate().unwrap()),
            Arc::new(OutcomeReporter::disabled()),
        )
        .with_seed(42)
    }

    fn cid() -> ContentId {
        ContentId::new("bafyTEST").unwrap()
    }

    async fn picks(session: &RetrievalSession, draws: usize) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for _ in 0..draws {
            let data = session.get_block(&cid()).await.unwrap();
            *counts.entry(String::from_utf8(data).unwrap()).or_default() += 1;
        }
        counts
    }

    #[tokio::test]
    async fn test_single_descriptor_bypasses_chooser() {
        // A lone negative weight would make the chooser fail.
        let session = session(vec![EdgeDescriptor::new("http://h", "abc", 5).with_weight(-1)]);
        let counts = picks(&session, 20).await;
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["5"], 20);
        assert_eq!(session.pool_state(), PoolState::Resolved { edges: 1 });
    }

    #[tokio::test]
    async fn test_all_zero_weights_pick_uniformly() {
        let descriptors = (0..4).map(|sn| EdgeDescriptor::new("http://h", "abc", sn)).collect();
        let session = session(descriptors);
        let counts = picks(&session, 400).await;
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n > 50));
    }

    #[tokio::test]
    async fn test_weighted_pool_favours_heavy_edge() {
        let descriptors = vec![
            EdgeDescriptor::new("http://h", "abc", 1).with_weight(1),
            EdgeDescriptor::new("http://h", "abc", 2).with_weight(9),
        ];
        let session = session(descriptors);
        let counts = picks(&session, 1000).await;
        assert!(counts["2"] > counts["1"] * 4);
    }

    #[tokio::test]
    async fn test_uniform_strategy_ignores_weights() {
        let descriptors = vec![
            EdgeDescriptor::new("http://h", "abc", 1).with_weight(1),
            EdgeDescriptor::new("http://h", "abc", 2).with_weight(1000),
        ];
        let session = session(descriptors).with_strategy(SelectionStrategy::Uniform);
        let counts = picks(&session, 1000).await;
        assert!(counts["1"] > 300);
    }

    #[tokio::test]
    async fn test_unsampleable_weights_are_a_selection_error() {
        let descriptors = vec![
            EdgeDescriptor::new("http://h", "abc", 1).with_weight(-1),
            EdgeDescriptor::new("http://h", "abc", 2).with_weight(-2),
        ];
        let session = session(descriptors);
        let err = session.get_block(&cid()).await.unwrap_err();
        assert_eq!(err, FetchError::NoValidChoices);
        assert_eq!(err.kind(), ErrorKind::Selection);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let session = session(vec![EdgeDescriptor::new("http://h", "abc", 1)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = session.get_block_with_cancel(&cid(), &cancel).await.unwrap_err();
        assert_eq!(err, FetchError::Cancelled);
        assert_eq!(session.pool_state(), PoolState::Unresolved);
    }

    #[tokio::test]
    async fn test_fixed_seed_reproduces_picks() {
        let descriptors: Vec<_> = (0..10)
            .map(|sn| EdgeDescriptor::new("http://h", "abc", sn).with_weight(sn + 1))
            .collect();
        let a = session(descriptors.clone());
        let b = session(descriptors);

        for _ in 0..25 {
            assert_eq!(a.get_block(&cid()).await.unwrap(), b.get_block(&cid()).await.unwrap());
        }
    }
}
