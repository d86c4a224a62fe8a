use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use babel_consensus::{BlockExecutor, CommittedBlock};
use babel_primitives::BlockHash;
use tracing::debug;

/// What the ledger keeps of a committed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub height: u64,
    pub round: u32,
    pub hash: BlockHash,
    /// `None` when the replica never received the block body.
    pub transactions: Option<usize>,
}

/// In-memory state machine: an append-only log of committed blocks.
/// Cloning shares the log, so the simulation can read it while the replica
/// owns the executor.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().clone()
    }

    /// Height of the last committed block, 0 when nothing was committed.
    pub fn height(&self) -> u64 {
        self.lock().last().map_or(0, |entry| entry.height)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash_at(&self, height: u64) -> Option<BlockHash> {
        self.lock()
            .iter()
            .find(|entry| entry.height == height)
            .map(|entry| entry.hash)
    }

    /// Committed transactions, counting only blocks whose body is known.
    pub fn transaction_count(&self) -> usize {
        self.lock()
            .iter()
            .filter_map(|entry| entry.transactions)
            .sum()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockExecutor for Ledger {
    fn execute(&mut self, block: &CommittedBlock) {
        let entry = LedgerEntry {
            height: block.height,
            round: block.round,
            hash: block.hash,
            transactions: block.block.as_ref().map(|block| block.transactions().len()),
        };
        debug!(height = entry.height, block = %entry.hash.short(), "Applied block");
        self.lock().push(entry);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Replicas {first} and {second} committed different blocks at height {height}: {first_hash} and {second_hash}")]
pub struct ForkError {
    pub height: u64,
    pub first: usize,
    pub first_hash: BlockHash,
    pub second: usize,
    pub second_hash: BlockHash,
}

/// Checks that all ledgers agree at every height they have in common.
/// Returns the highest height committed by every ledger.
pub fn verify_consistency(ledgers: &[Ledger]) -> Result<u64, ForkError> {
    let mut decided: BTreeMap<u64, (usize, BlockHash)> = BTreeMap::new();
    for (index, ledger) in ledgers.iter().enumerate() {
        for entry in ledger.entries() {
            let (first, first_hash) = *decided.entry(entry.height).or_insert((index, entry.hash));
            if first_hash != entry.hash {
                return Err(ForkError {
                    height: entry.height,
                    first,
                    first_hash,
                    second: index,
                    second_hash: entry.hash,
                });
            }
        }
    }

    Ok(ledgers.iter().map(Ledger::height).min().unwrap_or(0))
}
