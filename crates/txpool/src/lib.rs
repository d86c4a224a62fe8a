mod config;
mod pending;
mod transaction;
mod txpool;

pub use config::Config;
pub use transaction::PooledTransaction;
pub use txpool::{PoolError, TransactionPool};
