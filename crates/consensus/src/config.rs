use std::time::Duration;

use babel_primitives::ReplicaId;

use crate::quorum::Quorum;

/// How the proposer rotates between rounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProposerRotation {
    /// `round mod n`, independent of height.
    #[default]
    RoundOnly,
    /// `(height + round) mod n`.
    HeightAndRound,
}

/// What to do with a second vote of the same kind from the same voter in the same view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateVotePolicy {
    /// The later vote replaces the earlier one.
    #[default]
    Overwrite,
    /// A conflicting later vote is rejected as equivocation. A nil vote may
    /// still be replaced by a block vote.
    Reject,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Total number of replicas `n`. Fixed for the run.
    pub replica_count: usize,
    /// Identifier of this replica, in `0..replica_count`.
    pub replica_id: ReplicaId,
    /// Timeout of round 0. Later rounds back off exponentially. Defaults to 2 seconds.
    pub base_timeout: Duration,
    /// Height the replica starts at. Defaults to 1.
    pub initial_height: u64,
    pub proposer_rotation: ProposerRotation,
    pub duplicate_votes: DuplicateVotePolicy,
    /// Maximum transactions included in a proposed block. Defaults to 1000.
    pub max_block_transactions: usize,
    /// Maximum buffered messages for future views. Defaults to 4096.
    pub future_message_capacity: usize,
    /// Capacity of the replica's inbound event queue. Defaults to 8192.
    pub event_queue_capacity: usize,
    pub txpool: babel_txpool::Config,
}

impl Config {
    pub fn new(replica_count: usize, replica_id: ReplicaId) -> Self {
        Self {
            replica_count,
            replica_id,
            ..Default::default()
        }
    }

    /// Checks the configuration and derives the quorum. Every replica must
    /// refuse to start on error.
    pub fn validate(&self) -> Result<Quorum, ConfigError> {
        let quorum = Quorum::new(self.replica_count)?;

        if self.replica_id as usize >= self.replica_count {
            return Err(ConfigError::ReplicaIdOutOfRange {
                replica_id: self.replica_id,
                replicas: self.replica_count,
            });
        }
        if self.initial_height == 0 {
            return Err(ConfigError::ZeroInitialHeight);
        }
        if self.base_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }

        Ok(quorum)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replica_count: 4,
            replica_id: 0,
            base_timeout: Duration::from_secs(2),
            initial_height: 1,
            proposer_rotation: ProposerRotation::default(),
            duplicate_votes: DuplicateVotePolicy::default(),
            max_block_transactions: 1000,
            future_message_capacity: 4096,
            event_queue_capacity: 8192,
            txpool: babel_txpool::Config::default(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Replica count must be at least 1")]
    NoReplicas,
    #[error("Quorum threshold {threshold} is not a strict majority of {replicas} replicas")]
    InsufficientQuorum { replicas: usize, threshold: usize },
    #[error("Replica id {replica_id} is out of range for {replicas} replicas")]
    ReplicaIdOutOfRange {
        replica_id: ReplicaId,
        replicas: usize,
    },
    #[error("Initial height must be at least 1")]
    ZeroInitialHeight,
    #[error("Base timeout must be greater than zero")]
    ZeroTimeout,
    #[error("Event queue capacity must be greater than zero")]
    ZeroQueueCapacity,
}
