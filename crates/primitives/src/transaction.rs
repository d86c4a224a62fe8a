use std::time::{Duration, SystemTime, UNIX_EPOCH};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::codec;
use crate::crypto::sha256;
use crate::hash::TxHash;

/// A client transaction. The payload is opaque to consensus.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    client_id: u64,
    /// Milliseconds since unix epoch at which the client submitted the transaction.
    submitted_at: u64,
    payload: Vec<u8>,
}

impl Transaction {
    /// Creates a transaction stamped with the current wall clock time.
    pub fn new(client_id: u64, payload: Vec<u8>) -> Self {
        Self::with_timestamp(client_id, unix_millis(SystemTime::now()), payload)
    }

    pub fn with_timestamp(client_id: u64, submitted_at: u64, payload: Vec<u8>) -> Self {
        Self {
            client_id,
            submitted_at,
            payload,
        }
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn submitted_at(&self) -> u64 {
        self.submitted_at
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn hash(&self) -> TxHash {
        TxHash::from_array(sha256(&codec::serialize(self)))
    }

    /// Time elapsed between submission and `now`. Zero if the clock went backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        Duration::from_millis(unix_millis(now).saturating_sub(self.submitted_at))
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::Transaction;

    #[test]
    fn hash_covers_every_field() {
        let tx = Transaction::with_timestamp(1, 100, b"transfer".to_vec());

        assert_eq!(
            tx.hash(),
            Transaction::with_timestamp(1, 100, b"transfer".to_vec()).hash()
        );
        assert_ne!(
            tx.hash(),
            Transaction::with_timestamp(2, 100, b"transfer".to_vec()).hash()
        );
        assert_ne!(
            tx.hash(),
            Transaction::with_timestamp(1, 101, b"transfer".to_vec()).hash()
        );
        assert_ne!(
            tx.hash(),
            Transaction::with_timestamp(1, 100, b"transfers".to_vec()).hash()
        );
    }

    #[test]
    fn age() {
        let tx = Transaction::with_timestamp(1, 1_000, vec![]);
        let now = UNIX_EPOCH + Duration::from_millis(1_250);
        assert_eq!(tx.age(now), Duration::from_millis(250));

        let before = UNIX_EPOCH + Duration::from_millis(500);
        assert_eq!(tx.age(before), Duration::ZERO);
    }
}
