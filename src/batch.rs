//! Concurrent fetching of many content ids.
//!
//! Every requested id gets its own task; results are multiplexed onto one
//! channel in completion order. The channel closes once every task has
//! finished, whether it succeeded, failed or was abandoned through the
//! cancellation token.

use crate::config::ClientConfig;
use crate::error::{FetchError, Result};
use crate::gateway::Gateway;
use crate::observability;
use crate::session::RetrievalSession;
use crate::signer::Signer;
use crate::types::{Block, BlockOutcome, ContentId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default capacity of the output channel.
pub const DEFAULT_BUFFER: usize = 16;

/// Fans content ids out to concurrent retrievals.
#[derive(Clone, Debug)]
pub struct BatchFetcher {
    session: Arc<RetrievalSession>,
    gateway: Option<Gateway>,
    buffer: usize,
}

impl BatchFetcher {
    /// Edge-only fetcher over `session`.
    pub fn new(session: Arc<RetrievalSession>) -> Self {
        Self {
            session,
            gateway: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Fall back to `gateway` according to its policy.
    pub fn with_gateway(mut self, gateway: Gateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Output channel capacity; a slow consumer holds finished tasks back.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Build session and gateway from configuration.
    pub fn from_config(config: &ClientConfig, signer: Arc<dyn Signer>) -> Self {
        let fetcher = Self::new(Arc::new(RetrievalSession::from_config(config, signer)));
        match Gateway::from_config(config) {
            Some(gateway) => fetcher.with_gateway(gateway),
            None => fetcher,
        }
    }

    pub fn session(&self) -> &Arc<RetrievalSession> {
        &self.session
    }

    pub fn gateway(&self) -> Option<&Gateway> {
        self.gateway.as_ref()
    }

    /// Fetch one block, falling back to the gateway when the edge path fails
    /// in a fallback-eligible way or returns no data.
    pub async fn fetch_one(&self, cid: &ContentId, cancel: &CancellationToken) -> Result<Block> {
        self.fetch_under_root(cid, cid, cancel).await
    }

    async fn fetch_under_root(
        &self,
        cid: &ContentId,
        root: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<Block> {
        let edge = self.session.get_block_under_root(cid, root, cancel).await;

        let gateway = match &self.gateway {
            Some(gateway) => gateway,
            None => return edge.map(|data| Block::new(cid.clone(), data)),
        };

        match edge {
            Ok(data) if !data.is_empty() => Ok(Block::new(cid.clone(), data)),
            Ok(_) => {
                debug!(cid = %cid, "Edge returned no data, trying gateway");
                Self::fetch_from_gateway(gateway, cid, cancel).await
            }
            Err(e) if gateway.should_fall_back(&e) => {
                debug!(cid = %cid, error = %e, "Falling back to gateway");
                Self::fetch_from_gateway(gateway, cid, cancel).await
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_from_gateway(
        gateway: &Gateway,
        cid: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<Block> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = gateway.fetch(cid) => result,
        }
    }

    /// Fetch every id concurrently, emitting one outcome per id.
    ///
    /// An unresolved pool is resolved against the first id unless the
    /// session has its own root. Must be called within a Tokio runtime. Outcomes not yet published when
    /// `cancel` fires are abandoned.
    pub fn fetch_all(&self, cids: Vec<ContentId>, cancel: CancellationToken) -> mpsc::Receiver<BlockOutcome> {
        self.spawn_batch(cids, cancel, Some)
    }

    /// Fetch every id concurrently, emitting only the blocks that were retrieved.
    ///
    /// Failed items are logged and left out; compare counts to detect them.
    pub fn fetch_blocks(&self, cids: Vec<ContentId>, cancel: CancellationToken) -> mpsc::Receiver<Block> {
        self.spawn_batch(cids, cancel, |outcome: BlockOutcome| outcome.result.ok())
    }

    fn spawn_batch<T, F>(&self, cids: Vec<ContentId>, cancel: CancellationToken, emit: F) -> mpsc::Receiver<T>
    where
        T: Send + 'static,
        F: Fn(BlockOutcome) -> Option<T> + Copy + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut tasks = JoinSet::new();
        let Some(root) = cids.first().cloned() else {
            return rx;
        };

        debug!(items = cids.len(), "Starting batch fetch");

        for cid in cids {
            let fetcher = self.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let root = root.clone();

            tasks.spawn(async move {
                let result = fetcher.fetch_under_root(&cid, &root, &cancel).await;
                observability::record_batch_item(result.is_ok());
                if let Err(e) = &result {
                    warn!(cid = %cid, error = %e, "Batch item failed");
                }

                let Some(item) = emit(BlockOutcome { cid, result }) else {
                    return;
                };

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            debug!("Batch receiver dropped");
                        }
                    }
                }
            });
        }

        tokio::spawn(async move {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Batch task ended abnormally");
                }
            }
            drop(tx);
        });

        rx
    }
}
