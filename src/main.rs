//! Engine entry point.
//!
//! Loads configuration, installs structured logging, and runs the
//! supervisor until shutdown. All real work lives in the library; this
//! binary only wires it up (§10).
//!
//! Author: AI-Generated
//! Created: 2026-01-28
//! Modified: 2026-07-28 — replaced the Phase 1 placeholder loop with the
//! real config-load + Supervisor wiring.

use anyhow::{Context, Result};
use clap::Parser;
use dexarb_engine::types::ArbitragePath;
use dexarb_engine::{EngineConfig, OpportunitySink, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "dexarb-engine", about = "Cross-venue DEX arbitrage detection engine")]
struct Cli {
    /// Path to the engine's TOML configuration file.
    #[arg(long, env = "DEXARB_CONFIG", default_value = "config/engine.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    info!(chains = config.chains.len(), pairs = config.pairs.len(), "configuration loaded");

    let (opportunity_tx, mut opportunity_rx) = tokio::sync::mpsc::channel::<(u64, ArbitragePath)>(256);
    let sink = Arc::new(OpportunitySink::new(opportunity_tx, config.detector.dedup_window_secs));

    let reporter = tokio::spawn(async move {
        while let Some((id, path)) = opportunity_rx.recv().await {
            info!(
                opportunity_id = id,
                chain = %path.chain,
                hops = path.hop_count(),
                net_profit_bps = path.net_profit_bps,
                estimated_profit_usd = path.estimated_profit_usd,
                confidence = ?path.confidence_label,
                "arbitrage opportunity detected"
            );
        }
    });

    let supervisor = Arc::new(Supervisor::new(config));

    let health_handle = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tick.tick().await;
                for (chain, status) in supervisor.health().await.chains {
                    info!(%chain, ?status, "chain health");
                }
            }
        })
    };

    if let Err(e) = Arc::clone(&supervisor).run(sink).await {
        warn!(error = %e, "supervisor exited with an error");
    }

    health_handle.abort();
    reporter.abort();
    info!("engine shutdown complete");
    Ok(())
}
