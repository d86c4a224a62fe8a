use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use babel_consensus::{
    Config, ConsensusMessage, DuplicateVotePolicy, ProposerRotation, StateSnapshot,
};
use babel_metrics::{Collector, MetricsReport, SharedMetrics};
use babel_network::LocalTransport;
use babel_primitives::ReplicaId;
use serde::Deserialize;
use tracing::{info, warn, Level};

use crate::client::{Client, ClientConfig, Dispatch};
use crate::ledger::{verify_consistency, Ledger};
use crate::replica::Replica;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    RoundOnly,
    HeightAndRound,
}

impl From<Rotation> for ProposerRotation {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::RoundOnly => ProposerRotation::RoundOnly,
            Rotation::HeightAndRound => ProposerRotation::HeightAndRound,
        }
    }
}

/// Settings of a local run. Every field is optional in the TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub replicas: usize,
    /// How long the client submits transactions.
    pub duration_ms: u64,
    pub client_interval_ms: u64,
    pub dispatch: Dispatch,
    pub base_timeout_ms: u64,
    /// Bounds of the simulated network delay.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_block_transactions: usize,
    pub rotation: Rotation,
    /// Refuse a second, different vote from the same replica in a round
    /// instead of keeping the latest one.
    pub reject_equivocation: bool,
    pub log_level: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            replicas: 4,
            duration_ms: 10_000,
            client_interval_ms: 100,
            dispatch: Dispatch::All,
            base_timeout_ms: 1_000,
            min_delay_ms: 1,
            max_delay_ms: 5,
            max_block_transactions: 1_000,
            rotation: Rotation::RoundOnly,
            reject_equivocation: false,
            log_level: "info".to_string(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to parse simulation config")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn log_level(&self) -> anyhow::Result<Level> {
        self.log_level
            .parse()
            .with_context(|| format!("Invalid log level {:?}", self.log_level))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Consensus configuration of replica `id`.
    pub fn consensus_config(&self, id: ReplicaId) -> Config {
        Config {
            base_timeout: Duration::from_millis(self.base_timeout_ms),
            proposer_rotation: self.rotation.into(),
            duplicate_votes: if self.reject_equivocation {
                DuplicateVotePolicy::Reject
            } else {
                DuplicateVotePolicy::Overwrite
            },
            max_block_transactions: self.max_block_transactions,
            ..Config::new(self.replicas, id)
        }
    }

    fn network_config(&self) -> babel_network::Config {
        babel_network::Config::with_delay(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_id: 0,
            interval: Duration::from_millis(self.client_interval_ms),
            dispatch: self.dispatch,
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        self.consensus_config(0)
            .validate()
            .context("Invalid consensus settings")?;
        anyhow::ensure!(self.client_interval_ms > 0, "Client interval must be positive");
        // Without a delay empty heights are decided without ever yielding
        // to the timer
        anyhow::ensure!(self.min_delay_ms > 0, "Network delay must be at least 1ms");
        anyhow::ensure!(
            self.min_delay_ms <= self.max_delay_ms,
            "Minimum network delay exceeds the maximum"
        );
        Ok(())
    }
}

#[derive(Debug)]
pub struct ReplicaReport {
    pub id: ReplicaId,
    pub snapshot: StateSnapshot,
    /// Height of the last committed block.
    pub committed: u64,
    pub transactions: usize,
    pub metrics: MetricsReport,
}

#[derive(Debug)]
pub struct SimulationReport {
    pub replicas: Vec<ReplicaReport>,
    pub network: MetricsReport,
    /// Transactions generated by the client.
    pub submitted: u64,
    /// Highest height committed by every replica.
    pub common_height: u64,
}

impl SimulationReport {
    /// Whether any replica observed a protocol violation.
    pub fn is_suspect(&self) -> bool {
        self.replicas
            .iter()
            .any(|replica| replica.snapshot.protocol_violations > 0)
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "====== Simulation Report ======")?;
        writeln!(f, "Replicas: {}", self.replicas.len())?;
        writeln!(f, "Transactions submitted: {}", self.submitted)?;
        writeln!(f, "Common height: {}", self.common_height)?;
        for replica in &self.replicas {
            writeln!(
                f,
                "Replica {}: committed height {} with {} transactions, now at {} ({:?}), violations {}",
                replica.id,
                replica.committed,
                replica.transactions,
                replica.snapshot.view(),
                replica.snapshot.step,
                replica.snapshot.protocol_violations,
            )?;
        }
        for replica in &self.replicas {
            writeln!(f, "Replica {} metrics", replica.id)?;
            writeln!(f, "{}", replica.metrics)?;
        }
        writeln!(f, "Network metrics")?;
        write!(f, "{}", self.network)
    }
}

/// Runs `config.replicas` replicas over the in-memory transport while the
/// client submits load, then stops everything and checks that all replicas
/// committed the same blocks.
pub async fn run_local(config: &SimulationConfig) -> anyhow::Result<SimulationReport> {
    config.check()?;

    let network_metrics = Arc::new(Collector::new());
    let transport = Arc::new(LocalTransport::<ConsensusMessage>::new(
        config.network_config(),
        network_metrics.clone(),
    ));

    let mut replicas = Vec::with_capacity(config.replicas);
    let mut collectors = Vec::with_capacity(config.replicas);
    let mut ledgers = Vec::with_capacity(config.replicas);
    for id in 0..config.replicas as ReplicaId {
        let collector = Arc::new(Collector::new());
        let metrics: SharedMetrics = collector.clone();
        let ledger = Ledger::new();
        let replica = Replica::new(
            &config.consensus_config(id),
            transport.clone(),
            ledger.clone(),
            metrics,
        )
        .with_context(|| format!("Failed to create replica {id}"))?;

        replicas.push(replica);
        collectors.push(collector);
        ledgers.push(ledger);
    }

    info!(
        replicas = config.replicas,
        duration = ?config.duration(),
        "Starting local simulation"
    );
    network_metrics.start();
    for (replica, collector) in replicas.iter_mut().zip(&collectors) {
        collector.start();
        replica.start();
    }

    let senders = replicas.iter().map(Replica::sender).collect();
    let client = Client::new(senders, config.client_config()).run();
    tokio::time::sleep(config.duration()).await;

    let submitted = client.stop().await;
    for replica in &mut replicas {
        replica.stop().await;
    }

    let common_height = verify_consistency(&ledgers).context("Replicas diverged")?;
    let report = SimulationReport {
        replicas: replicas
            .iter()
            .zip(&collectors)
            .zip(&ledgers)
            .map(|((replica, collector), ledger)| ReplicaReport {
                id: replica.id(),
                snapshot: replica.snapshot(),
                committed: ledger.height(),
                transactions: ledger.transaction_count(),
                metrics: collector.report(),
            })
            .collect(),
        network: network_metrics.report(),
        submitted,
        common_height,
    };

    if report.is_suspect() {
        warn!("Protocol violations observed, run is suspect");
    }
    info!(submitted, common_height, "Simulation finished");

    Ok(report)
}
