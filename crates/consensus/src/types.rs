use std::fmt;
use std::sync::Arc;

use babel_primitives::{Block, BlockHash, ReplicaId};

/// A single (height, round) attempt of the agreement problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct View {
    pub height: u64,
    pub round: u32,
}

impl View {
    pub fn new(height: u64, round: u32) -> Self {
        Self { height, round }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.height, self.round)
    }
}

/// Sub-phase within a round. Commit is an action, not a resting step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    #[default]
    Propose,
    Prevote,
    Precommit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteKind {
    Prevote,
    Precommit,
}

/// The value a vote is cast for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteValue {
    /// The distinguished "no value" vote, signalling round failure.
    Nil,
    Block(BlockHash),
}

impl VoteValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn block_hash(&self) -> Option<BlockHash> {
        match self {
            Self::Nil => None,
            Self::Block(hash) => Some(*hash),
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Block(hash) => write!(f, "{}", hash.short()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vote {
    pub view: View,
    pub voter: ReplicaId,
    pub kind: VoteKind,
    pub value: VoteValue,
}

/// A value together with the round in which it reached prevote quorum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundValue {
    pub value: BlockHash,
    pub round: u32,
}

/// A decided block handed to the application.
#[derive(Clone, Debug)]
pub struct CommittedBlock {
    pub height: u64,
    pub round: u32,
    pub hash: BlockHash,
    /// Body of the decided block. `None` when the replica never received
    /// the proposal and only learned the decision from precommits.
    pub block: Option<Arc<Block>>,
}
