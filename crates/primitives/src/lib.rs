pub mod block;
pub mod codec;
pub mod crypto;
pub mod hash;
pub mod transaction;

pub use block::Block;
pub use hash::{BlockHash, HashConversionError, TxHash};
pub use transaction::Transaction;

/// Unique identifier of a replica, stable for the whole run.
pub type ReplicaId = u32;
