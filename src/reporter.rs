//! Bounded, best-effort outcome reporting.
//!
//! Each edge attempt produces at most one [`DownloadReport`]. Reports are
//! queued without blocking the caller and delivered by a fixed pool of
//! workers; when the queue is full the report is dropped. Delivery is never
//! retried and its result never reaches the fetch caller. Subscribers observe
//! what happened to each report through [`ReportEvent`]s.

use crate::config::ReportingConfig;
use crate::locator::LocatorClient;
use crate::signer::Signer;
use crate::types::{ContentId, DownloadReport};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happened to a submitted report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// The locator accepted the report.
    Delivered { cid: ContentId, serial_number: i64, succeeded: bool },
    /// Signing or delivery failed; the report is discarded.
    Failed { cid: ContentId, serial_number: i64, error: String },
    /// The queue was full or closed; the report was never sent.
    Dropped { cid: ContentId, serial_number: i64 },
}

/// Reporter statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReporterStats {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

impl ReporterStats {
    /// Reports accepted into the queue that have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.delivered + self.failed + self.dropped)
    }
}

#[derive(Debug)]
struct PendingReport {
    cid: ContentId,
    serial_number: i64,
    succeeded: bool,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

struct Worker {
    locator: Arc<dyn LocatorClient>,
    signer: Arc<dyn Signer>,
    timeout: Duration,
    events: broadcast::Sender<ReportEvent>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, queue: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingReport>>>) {
        loop {
            let next = { queue.lock().await.recv().await };
            match next {
                Some(pending) => self.deliver(pending).await,
                None => break,
            }
        }
    }

    async fn deliver(&self, pending: PendingReport) {
        let PendingReport {
            cid,
            serial_number,
            succeeded,
        } = pending;

        let signature = match self.signer.sign(cid.as_bytes()) {
            Ok(signature) => signature,
            Err(e) => {
                self.fail(cid, serial_number, e.to_string());
                return;
            }
        };

        let report = DownloadReport {
            serial_number,
            signature,
            succeeded,
        };

        match tokio::time::timeout(self.timeout, self.locator.report_outcome(&[report])).await {
            Ok(Ok(())) => {
                debug!(cid = %cid, sn = serial_number, succeeded, "Outcome reported");
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                crate::observability::record_report("delivered");
                let _ = self.events.send(ReportEvent::Delivered {
                    cid,
                    serial_number,
                    succeeded,
                });
            }
            Ok(Err(e)) => self.fail(cid, serial_number, e.to_string()),
            Err(_) => self.fail(
                cid,
                serial_number,
                format!("report timed out after {:?}", self.timeout),
            ),
        }
    }

    fn fail(&self, cid: ContentId, serial_number: i64, error: String) {
        warn!(cid = %cid, sn = serial_number, error = %error, "Outcome report failed");
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        crate::observability::record_report("failed");
        let _ = self.events.send(ReportEvent::Failed {
            cid,
            serial_number,
            error,
        });
    }
}

/// Sends download outcomes to the locator in the background.
pub struct OutcomeReporter {
    sender: Mutex<Option<mpsc::Sender<PendingReport>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<ReportEvent>,
    counters: Arc<Counters>,
}

impl OutcomeReporter {
    /// Start a reporter with `config.workers` delivery tasks.
    ///
    /// Must be called within a Tokio runtime. A disabled configuration yields
    /// a reporter that drops every submission.
    pub fn new(
        locator: Arc<dyn LocatorClient>,
        signer: Arc<dyn Signer>,
        config: &ReportingConfig,
    ) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let queue = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..config.workers.max(1))
            .map(|_| {
                let worker = Worker {
                    locator: Arc::clone(&locator),
                    signer: Arc::clone(&signer),
                    timeout: config.timeout,
                    events: events.clone(),
                    counters: Arc::clone(&counters),
                };
                tokio::spawn(worker.run(Arc::clone(&queue)))
            })
            .collect();

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            events,
            counters,
        }
    }

    /// A reporter that sends nothing.
    pub fn disabled() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            events,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue a report without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, cid: &ContentId, serial_number: i64, succeeded: bool) -> bool {
        let sender = match self.sender.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => return false,
        };

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let pending = PendingReport {
            cid: cid.clone(),
            serial_number,
            succeeded,
        };

        match sender.try_send(pending) {
            Ok(()) => true,
            Err(e) => {
                let pending = match e {
                    mpsc::error::TrySendError::Full(p) | mpsc::error::TrySendError::Closed(p) => p,
                };
                debug!(cid = %pending.cid, sn = pending.serial_number, "Report queue full, dropping");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                crate::observability::record_report("dropped");
                let _ = self.events.send(ReportEvent::Dropped {
                    cid: pending.cid,
                    serial_number: pending.serial_number,
                });
                false
            }
        }
    }

    /// Subscribe to report events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReportEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> ReporterStats {
        ReporterStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Stop accepting reports, deliver what is queued and wait for the workers.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Report worker ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for OutcomeReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeReporter")
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats())
            .finish()
    }
}
