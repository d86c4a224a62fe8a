use anyhow::Context;
use babel_node::{run_local, SimulationConfig};
use babel_tracing::initialize_tracing;
use tracing::{info, warn};

/// Runs a local simulation. Takes an optional path to a TOML config file,
/// defaults are used for everything it leaves out.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::load(&path)
            .with_context(|| format!("Failed to load config from {path}"))?,
        None => SimulationConfig::default(),
    };
    initialize_tracing(config.log_level()?);
    info!(?config, "Loaded configuration");

    let report = run_local(&config).await?;
    println!("{report}");
    if report.is_suspect() {
        warn!("Replicas reported protocol violations");
    }

    Ok(())
}
