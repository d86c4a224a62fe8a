use std::sync::OnceLock;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::codec;
use crate::crypto::sha256;
use crate::hash::BlockHash;
use crate::transaction::Transaction;
use crate::ReplicaId;

/// An ordered batch of transactions proposed by a replica.
///
/// Blocks are immutable once built, so the content hash is computed on first
/// use and cached for the lifetime of the block.
#[derive(Debug, BorshSerialize, BorshDeserialize)]
pub struct Block {
    proposer: ReplicaId,
    transactions: Vec<Transaction>,
    #[borsh(skip)]
    hash: OnceLock<BlockHash>,
}

impl Block {
    pub fn new(proposer: ReplicaId, transactions: Vec<Transaction>) -> Self {
        Self {
            proposer,
            transactions,
            hash: OnceLock::new(),
        }
    }

    pub fn empty(proposer: ReplicaId) -> Self {
        Self::new(proposer, vec![])
    }

    pub fn proposer(&self) -> ReplicaId {
        self.proposer
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Deterministic hash of the proposer and every transaction, in order.
    pub fn hash(&self) -> BlockHash {
        *self.hash.get_or_init(|| {
            let bytes = codec::serialize(&(self.proposer, &self.transactions));
            BlockHash::from_array(sha256(&bytes))
        })
    }
}

impl Clone for Block {
    fn clone(&self) -> Self {
        Self {
            proposer: self.proposer,
            transactions: self.transactions.clone(),
            hash: self.hash.clone(),
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.proposer == other.proposer && self.transactions == other.transactions
    }
}

impl Eq for Block {}

#[cfg(test)]
mod tests {
    use crate::codec;
    use crate::transaction::Transaction;

    use super::Block;

    fn txs() -> Vec<Transaction> {
        vec![
            Transaction::with_timestamp(1, 10, b"a".to_vec()),
            Transaction::with_timestamp(2, 20, b"b".to_vec()),
        ]
    }

    #[test]
    fn identical_blocks_hash_identically() {
        let a = Block::new(0, txs());
        let b = Block::new(0, txs());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a, b);
    }

    #[test]
    fn hash_depends_on_proposer_and_order() {
        let block = Block::new(0, txs());

        assert_ne!(block.hash(), Block::new(1, txs()).hash());

        let mut reversed = txs();
        reversed.reverse();
        assert_ne!(block.hash(), Block::new(0, reversed).hash());

        assert_ne!(Block::empty(0).hash(), Block::empty(1).hash());
    }

    #[test]
    fn hash_is_cached() {
        let block = Block::new(3, txs());
        let first = block.hash();
        assert_eq!(block.hash.get(), Some(&first));
        assert_eq!(block.clone().hash.get(), Some(&first));
    }

    #[test]
    fn decoded_block_recomputes_same_hash() {
        let block = Block::new(2, txs());
        let decoded: Block = codec::deserialize(&codec::serialize(&block)).unwrap();
        assert!(decoded.hash.get().is_none());
        assert_eq!(decoded.hash(), block.hash());
    }
}
