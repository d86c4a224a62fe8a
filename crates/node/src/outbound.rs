use std::sync::Arc;

use babel_consensus::{Broadcast, ConsensusMessage, Message};
use babel_network::Transport;
use babel_primitives::ReplicaId;

/// Engine-facing side of the transport. Stamps every message with the
/// replica it originates from.
pub struct Outbound<T> {
    id: ReplicaId,
    transport: Arc<T>,
}

impl<T> Outbound<T>
where
    T: Transport<ConsensusMessage>,
{
    pub fn new(id: ReplicaId, transport: Arc<T>) -> Self {
        Self { id, transport }
    }
}

impl<T> Broadcast for Outbound<T>
where
    T: Transport<ConsensusMessage>,
{
    fn broadcast(&self, message: Message) {
        self.transport
            .broadcast(ConsensusMessage::new(self.id, message));
    }

    fn send(&self, recipient: ReplicaId, message: Message) {
        self.transport
            .send(recipient, ConsensusMessage::new(self.id, message));
    }
}
