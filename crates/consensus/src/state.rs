use std::sync::Arc;

use babel_primitives::{Block, BlockHash};

use crate::types::{RoundValue, Step, View, VoteKind};
use crate::votes::VoteBook;

/// Protocol state of one replica. Owned by the engine and only ever mutated
/// while it processes a single event.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusState {
    height: u64,
    round: u32,
    step: Step,
    locked: Option<RoundValue>,
    valid: Option<RoundValue>,
    proposal: Option<Arc<Block>>,
    prevotes: VoteBook,
    precommits: VoteBook,
}

impl ConsensusState {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            round: 0,
            step: Step::Propose,
            locked: None,
            valid: None,
            proposal: None,
            prevotes: VoteBook::new(VoteKind::Prevote),
            precommits: VoteBook::new(VoteKind::Precommit),
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn view(&self) -> View {
        View::new(self.height, self.round)
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Value this replica precommitted last in the current height.
    pub fn locked(&self) -> Option<RoundValue> {
        self.locked
    }

    /// Highest-round value that reached prevote quorum in the current height.
    pub fn valid(&self) -> Option<RoundValue> {
        self.valid
    }

    /// Block accepted for the current view.
    pub fn proposal(&self) -> Option<&Arc<Block>> {
        self.proposal.as_ref()
    }

    pub fn prevotes(&self) -> &VoteBook {
        &self.prevotes
    }

    pub fn precommits(&self) -> &VoteBook {
        &self.precommits
    }

    pub(crate) fn prevotes_mut(&mut self) -> &mut VoteBook {
        &mut self.prevotes
    }

    pub(crate) fn precommits_mut(&mut self) -> &mut VoteBook {
        &mut self.precommits
    }

    /// Whether a message for `view` belongs to a view already left.
    pub fn is_stale(&self, view: View) -> bool {
        view < self.view()
    }

    pub(crate) fn set_step(&mut self, step: Step) {
        self.step = step;
    }

    pub(crate) fn set_proposal(&mut self, block: Arc<Block>) {
        self.proposal = Some(block);
    }

    pub(crate) fn lock(&mut self, value: BlockHash) {
        self.locked = Some(RoundValue {
            value,
            round: self.round,
        });
    }

    pub(crate) fn set_valid(&mut self, value: BlockHash, round: u32) {
        if self.valid.is_some_and(|valid| valid.round > round) {
            return;
        }
        self.valid = Some(RoundValue { value, round });
    }

    /// Moves to the next round of the current height.
    pub(crate) fn advance_round(&mut self) {
        self.round += 1;
        self.step = Step::Propose;
        self.proposal = None;
    }

    /// Moves to the next height, forgetting everything recorded for the
    /// heights below it.
    pub(crate) fn advance_height(&mut self) {
        self.height += 1;
        self.round = 0;
        self.step = Step::Propose;
        self.locked = None;
        self.valid = None;
        self.proposal = None;
        self.prevotes.prune(self.height);
        self.precommits.prune(self.height);
    }
}

/// Copyable summary of [`ConsensusState`] published after every event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    pub height: u64,
    pub round: u32,
    pub step: Step,
    pub locked_round: Option<u32>,
    pub valid_round: Option<u32>,
    /// Protocol violations observed so far. Non-zero marks the run as suspect.
    pub protocol_violations: u64,
}

impl StateSnapshot {
    pub(crate) fn new(state: &ConsensusState, protocol_violations: u64) -> Self {
        Self {
            height: state.height,
            round: state.round,
            step: state.step,
            locked_round: state.locked.map(|locked| locked.round),
            valid_round: state.valid.map(|valid| valid.round),
            protocol_violations,
        }
    }

    pub fn view(&self) -> View {
        View::new(self.height, self.round)
    }
}
