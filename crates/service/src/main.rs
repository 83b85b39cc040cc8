use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use isaac_assistant::{AssistantConfig, Orchestrator};
use isaac_service::{init_tracing, router};

#[derive(Parser, Debug)]
#[command(name = "isaac-service", version, about = "Sepsis management assistant web service")]
struct Args {
    /// Configuration file; falls back to `ISAAC_CONFIG`, then `isaac.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `service.bind_addr`.
    #[arg(long, env = "ISAAC_BIND_ADDR")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = AssistantConfig::discover(args.config.as_deref())?;
    let bind = args.bind.unwrap_or_else(|| config.service.bind_addr.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    for (step, target) in config.collections.iter() {
        info!(
            step,
            path = %target.path.display(),
            collection = %target.collection,
            "collection configured"
        );
    }
    let orchestrator = Arc::new(Orchestrator::from_config(&config));
    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr, model = %config.llm.model);
    axum::serve(listener, app).await?;
    Ok(())
}
