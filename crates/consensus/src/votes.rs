use std::collections::hash_map::Entry;
use std::collections::HashMap;

use babel_primitives::{BlockHash, ReplicaId};

use crate::config::DuplicateVotePolicy;
use crate::error::VoteError;
use crate::types::{View, VoteKind, VoteValue};
use crate::view_map::ViewSenderMap;

/// Result of recording a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote of the voter in this view.
    Inserted,
    /// The voter changed its vote, the earlier one is gone.
    Replaced(VoteValue),
    /// Same vote delivered again. Nothing changed.
    Duplicate,
}

/// Votes of one kind, one per voter and view.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteBook {
    kind: VoteKind,
    votes: ViewSenderMap<VoteValue>,
}

impl VoteBook {
    pub fn new(kind: VoteKind) -> Self {
        Self {
            kind,
            votes: ViewSenderMap::new(),
        }
    }

    pub fn kind(&self) -> VoteKind {
        self.kind
    }

    /// Records `value` as the vote of `voter` in `view`.
    ///
    /// `replicas` bounds the number of distinct voters of a view. Exceeding it
    /// means the replica count is misconfigured somewhere.
    pub(crate) fn insert(
        &mut self,
        view: View,
        voter: ReplicaId,
        value: VoteValue,
        policy: DuplicateVotePolicy,
        replicas: usize,
    ) -> Result<VoteOutcome, VoteError> {
        let senders = self.votes.senders(view);
        if !senders.contains_key(&voter) && senders.len() >= replicas {
            return Err(VoteError::TooManyVoters {
                view,
                voters: senders.len() + 1,
                replicas,
            });
        }

        match senders.entry(voter) {
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(VoteOutcome::Inserted)
            }
            Entry::Occupied(entry) if *entry.get() == value => Ok(VoteOutcome::Duplicate),
            // A round entered through a timeout starts with a nil prevote,
            // the vote for the proposal follows in the same round
            Entry::Occupied(mut entry) if entry.get().is_nil() => {
                Ok(VoteOutcome::Replaced(entry.insert(value)))
            }
            Entry::Occupied(mut entry) => match policy {
                DuplicateVotePolicy::Overwrite => Ok(VoteOutcome::Replaced(entry.insert(value))),
                DuplicateVotePolicy::Reject => Err(VoteError::Equivocation {
                    view,
                    voter,
                    recorded: *entry.get(),
                    received: value,
                }),
            },
        }
    }

    pub fn get(&self, view: View, voter: ReplicaId) -> Option<VoteValue> {
        self.votes
            .get_by_view(view)
            .and_then(|senders| senders.get(&voter))
            .copied()
    }

    /// Number of votes for `value` in `view`.
    pub fn count(&self, view: View, value: VoteValue) -> usize {
        self.votes.get_by_view(view).map_or(0, |senders| {
            senders.values().filter(|vote| **vote == value).count()
        })
    }

    /// Number of distinct voters in `view`.
    pub fn voters(&self, view: View) -> usize {
        self.votes.get_by_view(view).map_or(0, HashMap::len)
    }

    /// Value that gathered at least `threshold` votes in `view`, if any.
    /// With `2 * threshold > n` at most one value can qualify.
    pub fn quorum_value(&self, view: View, threshold: usize) -> Option<VoteValue> {
        let senders = self.votes.get_by_view(view)?;
        let mut tally: HashMap<VoteValue, usize> = HashMap::new();
        for value in senders.values() {
            let count = tally.entry(*value).or_default();
            *count += 1;
            if *count >= threshold {
                return Some(*value);
            }
        }
        None
    }

    /// Finds the lowest round of `height` in which some block gathered at
    /// least `threshold` votes.
    pub fn decision(&self, height: u64, threshold: usize) -> Option<(u32, BlockHash)> {
        self.votes.rounds(height).find_map(|(round, _)| {
            match self.quorum_value(View::new(height, round), threshold) {
                Some(VoteValue::Block(hash)) => Some((round, hash)),
                _ => None,
            }
        })
    }

    pub fn contains_height(&self, height: u64) -> bool {
        self.votes.contains_height(height)
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Drops every vote for heights strictly below `height`.
    pub(crate) fn prune(&mut self, height: u64) {
        self.votes.prune(height);
    }
}

#[cfg(test)]
mod tests {
    use babel_primitives::BlockHash;

    use crate::config::DuplicateVotePolicy;
    use crate::error::VoteError;
    use crate::types::{View, VoteKind, VoteValue};

    use super::{VoteBook, VoteOutcome};

    fn block(byte: u8) -> VoteValue {
        VoteValue::Block(BlockHash::from_array([byte; 32]))
    }

    #[test]
    fn overwrite_keeps_one_vote_per_voter() {
        let mut book = VoteBook::new(VoteKind::Prevote);
        let view = View::new(1, 0);
        let policy = DuplicateVotePolicy::Overwrite;

        assert_eq!(
            book.insert(view, 1, block(1), policy, 4),
            Ok(VoteOutcome::Inserted)
        );
        assert_eq!(
            book.insert(view, 1, block(1), policy, 4),
            Ok(VoteOutcome::Duplicate)
        );
        assert_eq!(book.count(view, block(1)), 1);

        assert_eq!(
            book.insert(view, 1, VoteValue::Nil, policy, 4),
            Ok(VoteOutcome::Replaced(block(1)))
        );
        assert_eq!(book.count(view, block(1)), 0);
        assert_eq!(book.count(view, VoteValue::Nil), 1);
        assert_eq!(book.voters(view), 1);
        assert_eq!(book.get(view, 1), Some(VoteValue::Nil));
    }

    #[test]
    fn reject_policy_reports_equivocation() {
        let mut book = VoteBook::new(VoteKind::Precommit);
        let view = View::new(3, 2);
        let policy = DuplicateVotePolicy::Reject;

        book.insert(view, 0, block(7), policy, 4).unwrap();
        // Re-delivery stays idempotent
        assert_eq!(
            book.insert(view, 0, block(7), policy, 4),
            Ok(VoteOutcome::Duplicate)
        );
        assert_eq!(
            book.insert(view, 0, block(8), policy, 4),
            Err(VoteError::Equivocation {
                view,
                voter: 0,
                recorded: block(7),
                received: block(8),
            })
        );
        assert_eq!(book.get(view, 0), Some(block(7)));

        // Nil may still be followed by a block, never the other way round
        book.insert(view, 1, VoteValue::Nil, policy, 4).unwrap();
        assert_eq!(
            book.insert(view, 1, block(7), policy, 4),
            Ok(VoteOutcome::Replaced(VoteValue::Nil))
        );
        assert!(book.insert(view, 1, VoteValue::Nil, policy, 4).is_err());
        assert_eq!(book.count(view, block(7)), 2);
    }

    #[test]
    fn too_many_voters() {
        let mut book = VoteBook::new(VoteKind::Prevote);
        let view = View::new(1, 0);
        for voter in 0..4 {
            book.insert(view, voter, VoteValue::Nil, DuplicateVotePolicy::Overwrite, 4)
                .unwrap();
        }

        assert!(matches!(
            book.insert(view, 9, VoteValue::Nil, DuplicateVotePolicy::Overwrite, 4),
            Err(VoteError::TooManyVoters { voters: 5, .. })
        ));
        // Known voters can still change their vote
        assert!(book
            .insert(view, 3, block(1), DuplicateVotePolicy::Overwrite, 4)
            .is_ok());
    }

    #[test]
    fn decision_ignores_nil_and_split_votes() {
        let mut book = VoteBook::new(VoteKind::Precommit);
        let policy = DuplicateVotePolicy::Overwrite;

        // Round 0: nil quorum
        for voter in 0..3 {
            book.insert(View::new(1, 0), voter, VoteValue::Nil, policy, 4)
                .unwrap();
        }
        // Round 1: split
        book.insert(View::new(1, 1), 0, block(1), policy, 4).unwrap();
        book.insert(View::new(1, 1), 1, block(2), policy, 4).unwrap();
        book.insert(View::new(1, 1), 2, block(1), policy, 4).unwrap();
        assert_eq!(book.decision(1, 3), None);
        assert_eq!(book.quorum_value(View::new(1, 0), 3), Some(VoteValue::Nil));
        assert_eq!(book.quorum_value(View::new(1, 1), 3), None);
        assert_eq!(book.quorum_value(View::new(1, 1), 2), Some(block(1)));

        // Round 2: decided
        for voter in 0..3 {
            book.insert(View::new(1, 2), voter, block(2), policy, 4)
                .unwrap();
        }
        assert_eq!(
            book.decision(1, 3),
            Some((2, BlockHash::from_array([2; 32])))
        );
        assert_eq!(book.decision(2, 3), None);
    }

    #[test]
    fn prune_purges_lower_heights() {
        let mut book = VoteBook::new(VoteKind::Prevote);
        let policy = DuplicateVotePolicy::Overwrite;
        for round in 0..10 {
            book.insert(View::new(5, round), 0, VoteValue::Nil, policy, 4)
                .unwrap();
        }
        book.insert(View::new(6, 0), 0, VoteValue::Nil, policy, 4)
            .unwrap();

        book.prune(6);
        assert!(!book.contains_height(5));
        assert!(book.contains_height(6));
    }
}
