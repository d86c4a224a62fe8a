use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use babel_primitives::TxHash;

use crate::PooledTransaction;

/// Transactions ready to be proposed, kept in arrival order.
pub struct PendingPool {
    submission_id: u64,

    by_hash: HashMap<TxHash, u64>,
    all: BTreeMap<u64, Arc<PooledTransaction>>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self {
            submission_id: 0,
            by_hash: HashMap::new(),
            all: BTreeMap::new(),
        }
    }

    /// Adds the transaction unless one with the same hash is already pending.
    /// Returns whether the transaction was inserted.
    pub fn add_transaction(&mut self, transaction: Arc<PooledTransaction>) -> bool {
        if self.by_hash.contains_key(&transaction.hash()) {
            return false;
        }

        let submission_id = self.next_id();
        self.by_hash.insert(transaction.hash(), submission_id);
        assert!(self.all.insert(submission_id, transaction).is_none());
        true
    }

    pub fn remove_transaction(&mut self, hash: &TxHash) -> Option<Arc<PooledTransaction>> {
        let submission_id = self.by_hash.remove(hash)?;
        let removed = self.all.remove(&submission_id);
        assert!(
            removed.is_some(),
            "Pending transaction index out of sync with pool"
        );
        removed
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Iterates over pending transactions, oldest first.
    pub fn best_iter(&self) -> impl Iterator<Item = &Arc<PooledTransaction>> + '_ {
        self.all.values()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.submission_id;
        self.submission_id = self.submission_id.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use babel_primitives::Transaction;

    use crate::PooledTransaction;

    use super::PendingPool;

    fn generate_pool_tx(client_id: u64, payload: &[u8]) -> Arc<PooledTransaction> {
        Arc::new(Transaction::with_timestamp(client_id, 0, payload.to_vec()).into())
    }

    #[test]
    fn add_transaction() {
        let mut pool = PendingPool::new();

        assert!(pool.add_transaction(generate_pool_tx(1, b"a")));
        assert!(pool.add_transaction(generate_pool_tx(1, b"b")));
        assert!(pool.add_transaction(generate_pool_tx(2, b"a")));
        // duplicate
        assert!(!pool.add_transaction(generate_pool_tx(1, b"b")));

        let v = pool
            .best_iter()
            .map(|tx| (tx.client_id(), tx.payload().to_vec()))
            .collect::<Vec<_>>();
        assert_eq!(
            v,
            vec![(1, b"a".to_vec()), (1, b"b".to_vec()), (2, b"a".to_vec())]
        );
    }

    #[test]
    fn remove_transaction() {
        let mut pool = PendingPool::new();

        let tx = generate_pool_tx(1, b"a");
        let hash = tx.hash();
        pool.add_transaction(tx);
        pool.add_transaction(generate_pool_tx(1, b"b"));

        assert!(pool.contains(&hash));
        assert!(pool.remove_transaction(&hash).is_some());
        assert!(!pool.contains(&hash));
        assert!(pool.remove_transaction(&hash).is_none());
        assert_eq!(pool.len(), 1);

        // Removed transaction can be re-added and goes to the back
        pool.add_transaction(generate_pool_tx(1, b"a"));
        let v = pool
            .best_iter()
            .map(|tx| tx.payload().to_vec())
            .collect::<Vec<_>>();
        assert_eq!(v, vec![b"b".to_vec(), b"a".to_vec()]);
    }
}
