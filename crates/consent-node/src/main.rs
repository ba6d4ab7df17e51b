mod constants;
mod routes;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};
use consent_core::{CorruptPolicy, Ledger};
use consent_storage::{open_store, Backend, StoreConfig};
use tracing::{info, warn, Level};

use crate::constants::{DEFAULT_LEDGER_PATH, DEFAULT_LISTEN};
use crate::routes::{router, AppState, SharedLedger};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Ledger location: the JSON file for `json`, a directory for `sled`
    #[arg(long, default_value = DEFAULT_LEDGER_PATH)]
    ledger_path: PathBuf,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = BackendArg::Json)]
    backend: BackendArg,

    /// What to do when the stored ledger cannot be parsed
    #[arg(long, value_enum, default_value_t = CorruptArg::Fail)]
    on_corrupt: CorruptArg,

    /// Start even if the stored chain fails verification (forensic access)
    #[arg(long)]
    skip_startup_verify: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Json,
    Sled,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Json => Backend::JsonFile,
            BackendArg::Sled => Backend::Sled,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CorruptArg {
    Fail,
    Recreate,
}

impl From<CorruptArg> for CorruptPolicy {
    fn from(arg: CorruptArg) -> Self {
        match arg {
            CorruptArg::Fail => CorruptPolicy::Fail,
            CorruptArg::Recreate => CorruptPolicy::Recreate,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = StoreConfig {
        backend: args.backend.into(),
        path: args.ledger_path.clone(),
    };
    let store = open_store(&config)?;
    let ledger: SharedLedger = Arc::new(Ledger::new(store, args.on_corrupt.into()));
    let length = ledger.init()?;
    info!(length, path = %args.ledger_path.display(), "ledger ready");

    if args.skip_startup_verify {
        warn!("startup verification skipped");
    } else {
        ledger.verify()?.ensure_valid()?;
        info!("startup verification passed");
    }

    let app = router(AppState { ledger });

    let addr: SocketAddr = args.listen.parse()?;
    info!("consent-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("consent-node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
