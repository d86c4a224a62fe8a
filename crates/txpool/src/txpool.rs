use std::sync::Arc;

use babel_primitives::{Transaction, TxHash};

use crate::config::Config;
use crate::pending::PendingPool;
use crate::PooledTransaction;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Transaction {0} is already pending")]
    AlreadyPending(TxHash),
    #[error("Transaction pool is full ({0} transactions)")]
    PoolFull(usize),
}

/// Pool of transactions waiting to be included in a proposal.
pub struct TransactionPool {
    config: Config,
    pending: PendingPool,
}

impl TransactionPool {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pending: PendingPool::new(),
        }
    }

    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<TxHash, PoolError> {
        if self.pending.len() >= self.config.max_tx_count {
            return Err(PoolError::PoolFull(self.pending.len()));
        }

        let transaction = Arc::new(PooledTransaction::from(transaction));
        let hash = transaction.hash();
        if !self.pending.add_transaction(transaction) {
            return Err(PoolError::AlreadyPending(hash));
        }

        Ok(hash)
    }

    /// Returns up to `limit` pending transactions, oldest first, without removing them.
    /// Transactions leave the pool only once they are committed.
    pub fn best_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.pending
            .best_iter()
            .take(limit)
            .map(|tx| tx.transaction().clone())
            .collect()
    }

    /// Removes committed transactions. Returns how many of them were pending here.
    pub fn remove_committed<'a>(
        &mut self,
        transactions: impl IntoIterator<Item = &'a Transaction>,
    ) -> usize {
        transactions
            .into_iter()
            .filter(|tx| self.pending.remove_transaction(&tx.hash()).is_some())
            .count()
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.pending.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use babel_primitives::Transaction;

    use crate::config::Config;

    use super::{PoolError, TransactionPool};

    fn tx(n: u8) -> Transaction {
        Transaction::with_timestamp(7, n as u64, vec![n])
    }

    #[test]
    fn best_transactions_respects_limit_and_order() {
        let mut pool = TransactionPool::default();
        for n in 0..5 {
            pool.add_transaction(tx(n)).unwrap();
        }

        assert_eq!(pool.best_transactions(3), vec![tx(0), tx(1), tx(2)]);
        // Taking best transactions does not drain the pool
        assert_eq!(pool.len(), 5);
    }

    #[test]
    fn rejects_duplicates_and_overflow() {
        let mut pool = TransactionPool::new(Config { max_tx_count: 2 });

        let hash = pool.add_transaction(tx(0)).unwrap();
        assert_eq!(
            pool.add_transaction(tx(0)),
            Err(PoolError::AlreadyPending(hash))
        );
        pool.add_transaction(tx(1)).unwrap();
        assert_eq!(pool.add_transaction(tx(2)), Err(PoolError::PoolFull(2)));
    }

    #[test]
    fn remove_committed() {
        let mut pool = TransactionPool::default();
        pool.add_transaction(tx(0)).unwrap();
        pool.add_transaction(tx(1)).unwrap();

        // tx(9) was never seen by this pool
        let committed = vec![tx(1), tx(9)];
        assert_eq!(pool.remove_committed(&committed), 1);
        assert_eq!(pool.best_transactions(10), vec![tx(0)]);
        assert!(!pool.contains(&tx(1).hash()));
    }
}
