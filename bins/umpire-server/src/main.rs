mod handlers;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use umpire_core::Agent;

/// How often the catalog is rebuilt from its sources.
const REFRESH_INTERVAL: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "umpire-server", about = "HTTP surface for the Umpire judge")]
struct Args {
    /// Directory containing problems
    #[arg(long)]
    problemsdir: Option<PathBuf>,

    /// Remote problems source (e.g. http://localhost:3033)
    #[arg(long)]
    serverdb: Option<String>,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:1323")]
    addr: String,
}

pub struct AppState {
    pub agent: Arc<Agent>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Umpire server booting...");

    let args = Args::parse();
    let agent = Arc::new(Agent::connect(args.problemsdir.clone()).map_err(|err| {
        error!(error = %err, "failed to initialize docker client");
        anyhow::anyhow!(err.to_string())
    })?);

    let count = agent.refresh_catalog(args.serverdb.as_deref()).await;
    info!(problems = count, "initial catalog loaded");

    // Background refresher: failures are logged and the current catalog is
    // retained until the next tick.
    {
        let agent = agent.clone();
        let serverdb = args.serverdb.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                info!("refreshing catalog");
                agent.refresh_catalog(serverdb.as_deref()).await;
            }
        });
    }

    let state = Arc::new(AppState { agent });
    let app = routes::routes().with_state(state);

    let listener = TcpListener::bind(&args.addr).await?;
    info!(addr = %args.addr, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
