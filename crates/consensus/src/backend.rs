use babel_primitives::ReplicaId;

use crate::messages::Message;
use crate::types::CommittedBlock;

/// Outbound side of the engine. Implementations stamp the sender and hand
/// the message to the transport without blocking.
pub trait Broadcast: Send + 'static {
    /// Sends the message to every other replica.
    fn broadcast(&self, message: Message);

    fn send(&self, recipient: ReplicaId, message: Message);
}

/// State machine that applies decided blocks, in height order.
pub trait BlockExecutor: Send + 'static {
    fn execute(&mut self, block: &CommittedBlock);
}
