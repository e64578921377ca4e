//! edgefetch - a client for retrieving content-addressed blocks from an
//! edge-caching network.
//!
//! A central locator knows which edge nodes cache a content id and hands out
//! short-lived signed capabilities for them. The client picks one edge per
//! request (weighted by the locator's hints), fetches the raw bytes with the
//! capability, reports the outcome back to the locator and falls back to a
//! public or local gateway when no edge holds the content.
//!
//! # Architecture
//!
//! ```text
//! BatchFetcher ──► RetrievalSession ──► WeightedChooser ──► edge (HTTP GET)
//!      │                 │                                     │ not found
//!      │                 ├──► LocatorClient (resolve, once)    ▼
//!      │                 └──► OutcomeReporter ──► LocatorClient (report)
//!      └──────────────────────────────────────────────► Gateway (HTTP POST)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use edgefetch::batch::BatchFetcher;
//! use edgefetch::config::ClientConfig;
//! use edgefetch::signer::KeyPair;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> edgefetch::Result<()> {
//!     let config = ClientConfig::from_env();
//!     let fetcher = BatchFetcher::from_config(&config, Arc::new(KeyPair::generate()?));
//!
//!     let ids = vec!["bafyROOT".parse()?, "bafyLEAF".parse()?];
//!     let mut outcomes = fetcher.fetch_all(ids, CancellationToken::new());
//!     while let Some(outcome) = outcomes.recv().await {
//!         println!("{}: {}", outcome.cid, outcome.is_ok());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod batch;
pub mod chooser;
pub mod gateway;
pub mod locator;
pub mod reporter;
pub mod session;
pub mod signer;
pub mod transport;

pub mod cli;
pub mod observability;

// Re-exports
pub use batch::BatchFetcher;
pub use error::{ErrorKind, FetchError, Result};
pub use session::{PoolState, RetrievalSession, SelectionStrategy};
pub use types::{Block, BlockOutcome, ContentId, DownloadReport, EdgeDescriptor};
