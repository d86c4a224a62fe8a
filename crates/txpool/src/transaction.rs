use std::ops::Deref;
use std::time::Instant;

use babel_primitives::{Transaction, TxHash};

#[derive(Debug)]
pub struct PooledTransaction {
    tx: Transaction,
    hash: TxHash,
    timestamp: Instant,
}

impl PooledTransaction {
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Local arrival time of the transaction.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }
}

impl From<Transaction> for PooledTransaction {
    fn from(tx: Transaction) -> Self {
        Self {
            hash: tx.hash(),
            tx,
            timestamp: Instant::now(),
        }
    }
}

impl Deref for PooledTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}
