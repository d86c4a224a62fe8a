use std::time::Duration;

use babel_primitives::Transaction;
use rand::Rng;
use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::replica::{EventSender, SubmitError};

/// Which replicas receive a submitted transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// Every replica, so whichever replica proposes next can include it.
    #[default]
    All,
    /// One replica picked at random per transaction.
    Random,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub client_id: u64,
    /// Time between two submissions.
    pub interval: Duration,
    pub dispatch: Dispatch,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: 0,
            interval: Duration::from_millis(100),
            dispatch: Dispatch::default(),
        }
    }
}

/// Load generator submitting a fresh transaction on every tick.
pub struct Client {
    replicas: Vec<EventSender>,
    config: ClientConfig,
}

impl Client {
    pub fn new(replicas: Vec<EventSender>, config: ClientConfig) -> Self {
        Self { replicas, config }
    }

    /// Spawns the submission loop.
    pub fn run(self) -> ClientHandle {
        let (cancel, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(self.submit_loop(cancel_rx));
        ClientHandle { cancel, task }
    }

    async fn submit_loop(self, mut cancel: oneshot::Receiver<()>) -> u64 {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sequence = 0u64;

        info!(
            client = self.config.client_id,
            replicas = self.replicas.len(),
            interval = ?self.config.interval,
            "Client started"
        );
        loop {
            select! {
                biased;
                _ = &mut cancel => break,
                _ = ticker.tick() => {
                    if self.replicas.is_empty() {
                        continue;
                    }
                    let tx = Transaction::new(self.config.client_id, sequence.to_be_bytes().to_vec());
                    sequence += 1;
                    self.submit(tx);
                }
            }
        }
        info!(client = self.config.client_id, submitted = sequence, "Client stopped");

        sequence
    }

    fn submit(&self, tx: Transaction) {
        let targets: &[EventSender] = match self.config.dispatch {
            Dispatch::All => &self.replicas,
            Dispatch::Random => {
                let index = rand::thread_rng().gen_range(0..self.replicas.len());
                &self.replicas[index..=index]
            }
        };

        debug!(tx = %tx.hash().short(), targets = targets.len(), "Submitting transaction");
        for replica in targets {
            match replica.submit(tx.clone()) {
                Ok(()) => {}
                Err(SubmitError::Stopped) => {
                    debug!(replica = replica.replica(), "Skipping stopped replica");
                }
                Err(err) => warn!(replica = replica.replica(), %err, "Failed to submit transaction"),
            }
        }
    }
}

pub struct ClientHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl ClientHandle {
    /// Stops the client. Returns how many transactions it generated.
    pub async fn stop(self) -> u64 {
        let _ = self.cancel.send(());
        self.task.await.unwrap_or_else(|err| {
            warn!(%err, "Client task failed");
            0
        })
    }
}
