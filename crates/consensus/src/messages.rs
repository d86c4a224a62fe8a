use std::fmt;
use std::sync::Arc;

use babel_network::Routable;
use babel_primitives::{Block, ReplicaId};

use crate::error::MessageError;
use crate::types::{View, VoteValue};
use crate::view_map::ViewMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Propose,
    Prevote,
    Precommit,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Propose => write!(f, "propose"),
            Self::Prevote => write!(f, "prevote"),
            Self::Precommit => write!(f, "precommit"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Proposed block. A proposal without a block is malformed.
    Propose(Option<Arc<Block>>),
    Prevote(VoteValue),
    Precommit(VoteValue),
}

/// Protocol message as produced by the engine, without sender.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub view: View,
    pub payload: Payload,
}

impl Message {
    pub fn propose(view: View, block: Arc<Block>) -> Self {
        Self {
            view,
            payload: Payload::Propose(Some(block)),
        }
    }

    pub fn prevote(view: View, value: VoteValue) -> Self {
        Self {
            view,
            payload: Payload::Prevote(value),
        }
    }

    pub fn precommit(view: View, value: VoteValue) -> Self {
        Self {
            view,
            payload: Payload::Precommit(value),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.payload {
            Payload::Propose(_) => MessageKind::Propose,
            Payload::Prevote(_) => MessageKind::Prevote,
            Payload::Precommit(_) => MessageKind::Precommit,
        }
    }

    /// Vote value carried by a prevote or precommit.
    pub fn vote_value(&self) -> Option<VoteValue> {
        match self.payload {
            Payload::Propose(_) => None,
            Payload::Prevote(value) | Payload::Precommit(value) => Some(value),
        }
    }
}

/// A message on the wire, stamped with the replica that sent it.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusMessage {
    pub from: ReplicaId,
    pub message: Message,
}

impl ConsensusMessage {
    pub fn new(from: ReplicaId, message: Message) -> Self {
        Self { from, message }
    }
}

impl Routable for ConsensusMessage {
    fn sender(&self) -> ReplicaId {
        self.from
    }
}

/// Bounded buffer for messages addressed to views the replica has not
/// reached yet. Messages are handed back in arrival order once their view
/// is entered.
#[derive(Debug)]
pub(crate) struct FutureMessages {
    messages: ViewMap<Vec<(ReplicaId, Message)>>,
    len: usize,
    capacity: usize,
}

impl FutureMessages {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            messages: ViewMap::new(),
            len: 0,
            capacity,
        }
    }

    pub(crate) fn push(&mut self, sender: ReplicaId, message: Message) -> Result<(), MessageError> {
        if self.len >= self.capacity {
            return Err(MessageError::BufferFull);
        }

        self.messages
            .view_entry(message.view)
            .or_default()
            .push((sender, message));
        self.len += 1;
        Ok(())
    }

    pub(crate) fn take(&mut self, view: View) -> Vec<(ReplicaId, Message)> {
        let messages = self.messages.remove_view(view).unwrap_or_default();
        self.len -= messages.len();
        messages
    }

    /// Drops messages for heights strictly below `height`.
    pub(crate) fn prune(&mut self, height: u64) {
        self.messages.prune(height);
        self.len = self.messages.values().map(Vec::len).sum();
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use crate::error::MessageError;
    use crate::types::{View, VoteValue};

    use super::{FutureMessages, Message, MessageKind};

    #[test]
    fn future_messages_are_bounded_and_ordered() {
        let mut future = FutureMessages::new(3);
        let view = View::new(2, 0);

        future.push(1, Message::prevote(view, VoteValue::Nil)).unwrap();
        future.push(2, Message::precommit(view, VoteValue::Nil)).unwrap();
        future
            .push(3, Message::prevote(View::new(3, 1), VoteValue::Nil))
            .unwrap();
        assert_eq!(
            future.push(1, Message::prevote(view, VoteValue::Nil)),
            Err(MessageError::BufferFull)
        );

        let taken = future.take(view);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].0, 1);
        assert_eq!(taken[1].1.kind(), MessageKind::Precommit);
        assert_eq!(future.len(), 1);
        assert!(future.take(view).is_empty());

        future.prune(4);
        assert_eq!(future.len(), 0);
    }
}
