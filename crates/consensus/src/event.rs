use babel_primitives::Transaction;

use crate::messages::ConsensusMessage;
use crate::types::View;

/// Everything a replica reacts to. All producers only enqueue events, the
/// replica's single consumer applies them one at a time.
#[derive(Clone, Debug)]
pub enum Event {
    Message(ConsensusMessage),
    Transaction(Transaction),
    /// Timer armed for `view` expired.
    Timeout(View),
}

impl From<ConsensusMessage> for Event {
    fn from(message: ConsensusMessage) -> Self {
        Self::Message(message)
    }
}

impl From<Transaction> for Event {
    fn from(tx: Transaction) -> Self {
        Self::Transaction(tx)
    }
}
