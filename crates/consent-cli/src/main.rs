use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use consent_core::{verify, violations, Block, ChainStore, Verification, Violation};
use consent_storage::JsonFileStore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "consent-cli")]
#[command(about = "CLI client for the consent ledger node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a consent decision
    Record {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// Subject of the consent
        #[arg(long)]
        user_id: String,
        /// Whether consent is given (false records a withdrawal)
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        consent_given: bool,
        /// Profile being attested, as JSON; only its hash is stored
        #[arg(long, default_value = "{}")]
        profile: String,
    },
    /// List every block in the ledger
    List {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
        /// Show the most recent block first
        #[arg(long)]
        newest_first: bool,
    },
    /// Ask the node to verify its chain
    Verify {
        /// Node base URL (e.g. http://127.0.0.1:8080)
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        node: String,
    },
    /// Verify a ledger JSON file directly, without a node
    VerifyFile {
        /// Path to the ledger file
        #[arg(long, default_value = "./data/ledger.json")]
        path: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsentOut {
    user_id: String,
    consent_given: bool,
    profile_data: serde_json::Value,
}

#[derive(Deserialize)]
struct LedgerIn {
    ledger: Vec<Block>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Record {
            node,
            user_id,
            consent_given,
            profile,
        } => {
            let profile_data: serde_json::Value =
                serde_json::from_str(&profile).context("--profile must be valid JSON")?;
            let body = ConsentOut {
                user_id,
                consent_given,
                profile_data,
            };
            let client = reqwest::Client::new();
            let res = client.post(format!("{node}/consent")).json(&body).send().await?;
            let status = res.status();
            let body = res.text().await?;
            println!("status: {}", status);
            println!("{body}");
            if !status.is_success() {
                bail!("consent was not recorded");
            }
        }
        Command::List { node, newest_first } => {
            let order = if newest_first { "newest" } else { "oldest" };
            let res = reqwest::get(format!("{node}/ledger?order={order}")).await?;
            let listing: LedgerIn = res.error_for_status()?.json().await?;
            let total = listing.ledger.len();
            for (i, block) in listing.ledger.iter().enumerate() {
                let number = if newest_first { total - i } else { i + 1 };
                println!("{}", describe(number, block));
            }
        }
        Command::Verify { node } => {
            let res = reqwest::get(format!("{node}/ledger/verify")).await?;
            let report: serde_json::Value = res.error_for_status()?.json().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report["status"] != "valid" {
                bail!("ledger failed verification");
            }
        }
        Command::VerifyFile { path } => {
            let found = audit_file(&path)?;
            if found.is_empty() {
                println!("valid: {}", path.display());
            } else {
                for v in &found {
                    println!("block {}: {}", v.index, v.reason);
                }
                bail!("{} violation(s) in {}", found.len(), path.display());
            }
        }
    }
    Ok(())
}

/// Load a ledger file and return every violation in it.
fn audit_file(path: &Path) -> Result<Vec<Violation>> {
    let store = JsonFileStore::new(path);
    let blocks = store
        .load()?
        .with_context(|| format!("no ledger at {}", path.display()))?;
    debug!(blocks = blocks.len(), "ledger file loaded");
    if let Verification::Invalid(first) = verify(&blocks) {
        debug!(index = first.index, reason = %first.reason, "first violation");
    }
    Ok(violations(&blocks))
}

fn describe(number: usize, block: &Block) -> String {
    let data_hash = block
        .data
        .as_consent()
        .map(|d| d.profile_hash.as_str())
        .unwrap_or("N/A");
    format!(
        "Block #{number} {}\n  type: {}\n  data hash: {data_hash}\n  hash: {}\n  previous: {}",
        block.timestamp, block.transaction_type, block.hash, block.previous_hash
    )
}
