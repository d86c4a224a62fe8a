pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod messages;
pub mod pacemaker;
pub mod quorum;
pub mod state;
pub mod types;
pub mod votes;

mod view_map;

#[cfg(test)]
mod tests;

pub use backend::{BlockExecutor, Broadcast};
pub use config::{Config, ConfigError, DuplicateVotePolicy, ProposerRotation};
pub use engine::TendermintEngine;
pub use error::{MessageError, ProposeError, Severity, VoteError};
pub use event::Event;
pub use messages::{ConsensusMessage, Message, MessageKind, Payload};
pub use pacemaker::Pacemaker;
pub use quorum::Quorum;
pub use state::{ConsensusState, StateSnapshot};
pub use types::{CommittedBlock, RoundValue, Step, View, Vote, VoteKind, VoteValue};
pub use votes::{VoteBook, VoteOutcome};
