//! Command-line interface for edgefetch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// edgefetch - retrieve content-addressed blocks from an edge-caching network.
#[derive(Parser)]
#[command(name = "edgefetch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (JSON)
    #[arg(short, long, env = "EDGEFETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Locator address, e.g. http://127.0.0.1:5000
    #[arg(long, env = "EDGEFETCH_LOCATOR")]
    pub locator: Option<String>,

    /// Gateway address used when no edge serves a block
    #[arg(long, env = "EDGEFETCH_GATEWAY")]
    pub gateway: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EDGEFETCH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// PKCS#8 file holding the client identity; a fresh one is generated if absent
    #[arg(long, env = "EDGEFETCH_IDENTITY")]
    pub identity: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch a single block
    Get {
        /// Content id
        cid: String,

        /// Write the block here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Never fall back to the gateway
        #[arg(long)]
        no_gateway: bool,
    },

    /// Fetch many blocks concurrently
    Batch {
        /// Content ids; the first one is the root the edge pool is resolved for
        #[arg(required = true)]
        cids: Vec<String>,

        /// Write each block to DIR/<cid>
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Print the client's public key
    Pubkey {
        /// Generate a new identity and save it as PKCS#8 to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_batch() {
        let cli = Cli::try_parse_from([
            "edgefetch",
            "--locator",
            "http://10.0.0.1:5000",
            "batch",
            "bafyROOT",
            "bafyA",
            "--out-dir",
            "/tmp/blocks",
        ])
        .unwrap();

        assert_eq!(cli.locator.as_deref(), Some("http://10.0.0.1:5000"));
        match cli.command {
            Commands::Batch { cids, out_dir } => {
                assert_eq!(cids, vec!["bafyROOT", "bafyA"]);
                assert_eq!(out_dir, Some(PathBuf::from("/tmp/blocks")));
            }
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn test_batch_requires_ids() {
        assert!(Cli::try_parse_from(["edgefetch", "batch"]).is_err());
    }

    #[test]
    fn test_parse_get_flags() {
        let cli = Cli::try_parse_from(["edgefetch", "get", "bafyTEST", "--no-gateway"]).unwrap();
        match cli.command {
            Commands::Get { cid, out, no_gateway } => {
                assert_eq!(cid, "bafyTEST");
                assert!(out.is_none());
                assert!(no_gateway);
            }
            _ => panic!("expected get"),
        }
    }
}
