//! edgefetch CLI - Main entry point.

use anyhow::Context;
use edgefetch::batch::BatchFetcher;
use edgefetch::cli::{Cli, Commands};
use edgefetch::config::ClientConfig;
use edgefetch::signer::{KeyPair, Signer};
use edgefetch::types::ContentId;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Get { cid, out, no_gateway } => {
            if no_gateway {
                config.gateway.enabled = false;
            }
            edgefetch::observability::init(&config.observability)?;

            let cid: ContentId = cid.parse()?;
            let signer = load_identity(cli.identity.as_deref())?;
            let fetcher = BatchFetcher::from_config(&config, signer);
            let cancel = cancel_on_ctrl_c();

            let result = fetcher.fetch_one(&cid, &cancel).await;
            fetcher.session().reporter().shutdown().await;
            let block = result?;

            match out {
                Some(path) => {
                    std::fs::write(&path, &block.data)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(cid = %cid, bytes = block.len(), path = %path.display(), "Block written");
                }
                None => std::io::stdout().write_all(&block.data)?,
            }
        }

        Commands::Batch { cids, out_dir } => {
            edgefetch::observability::init(&config.observability)?;

            let cids = cids
                .iter()
                .map(|cid| cid.parse::<ContentId>())
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(dir) = &out_dir {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating {}", dir.display()))?;
            }

            let signer = load_identity(cli.identity.as_deref())?;
            let fetcher = BatchFetcher::from_config(&config, signer);
            let cancel = cancel_on_ctrl_c();

            let requested = cids.len();
            let mut fetched = 0usize;
            let mut failed = 0usize;
            let mut outcomes = fetcher.fetch_all(cids, cancel.clone());

            while let Some(outcome) = outcomes.recv().await {
                match outcome.result {
                    Ok(block) => {
                        fetched += 1;
                        if let Some(dir) = &out_dir {
                            let path = dir.join(block.cid.as_str());
                            std::fs::write(&path, &block.data)
                                .with_context(|| format!("writing {}", path.display()))?;
                        }
                        println!("{}\t{} bytes", block.cid, block.len());
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{}\tfailed: {}", outcome.cid, e);
                    }
                }
            }

            fetcher.session().reporter().shutdown().await;
            println!("{} of {} blocks fetched", fetched, requested);

            if cancel.is_cancelled() {
                anyhow::bail!("interrupted");
            }
            if failed > 0 {
                anyhow::bail!("{} blocks failed", failed);
            }
        }

        Commands::Pubkey { save } => {
            let keypair = match save {
                Some(path) => {
                    let pkcs8 = KeyPair::generate_pkcs8()?;
                    std::fs::write(&path, &pkcs8)
                        .with_context(|| format!("writing {}", path.display()))?;
                    KeyPair::from_pkcs8(&pkcs8)?
                }
                None => match cli.identity.as_deref() {
                    Some(path) => read_identity(path)?,
                    None => KeyPair::generate()?,
                },
            };
            print!("{}", keypair.public_key_pem());
        }

        Commands::Version => {
            println!("edgefetch v{}", env!("CARGO_PKG_VERSION"));
            println!("Retrieve content-addressed blocks from an edge-caching network");
        }
    }

    Ok(())
}

/// File, then environment, then command-line flags.
fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env(),
    };

    if let Some(locator) = &cli.locator {
        config.locator.address = locator.clone();
    }
    if let Some(gateway) = &cli.gateway {
        config.gateway.address = gateway.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn load_identity(path: Option<&Path>) -> anyhow::Result<Arc<dyn Signer>> {
    let keypair = match path {
        Some(path) => read_identity(path)?,
        None => KeyPair::generate()?,
    };
    Ok(Arc::new(keypair))
}

fn read_identity(path: &Path) -> anyhow::Result<KeyPair> {
    let pkcs8 = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(KeyPair::from_pkcs8(&pkcs8)?)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling outstanding fetches");
            token.cancel();
        }
    });
    cancel
}
