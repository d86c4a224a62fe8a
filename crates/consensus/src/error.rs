use babel_primitives::ReplicaId;

use crate::types::{Step, View, VoteValue};

/// How a rejected message should be treated by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected under normal operation: stale, duplicated or not yet relevant.
    Ignored,
    /// Invalid but harmless. The sender's later messages are still considered.
    Rejected,
    /// Evidence of a faulty peer or a misconfigured run.
    Violation,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("Stale message for view {view}, currently at {current}")]
    Stale { view: View, current: View },
    #[error("Message for future view {view} buffered")]
    Deferred { view: View },
    #[error("Message for view {view} is too far ahead of {current}")]
    TooFarAhead { view: View, current: View },
    #[error("Future message buffer is full")]
    BufferFull,
    #[error("Message from unknown replica {0}")]
    UnknownSender(ReplicaId),
    #[error("Message from ourselves")]
    SelfMessage,
    #[error("Proposal from {sender} but {expected} is the proposer")]
    NotProposer {
        sender: ReplicaId,
        expected: ReplicaId,
    },
    #[error("Proposal received in step {0:?}")]
    UnexpectedStep(Step),
    #[error("Proposal already accepted for this view")]
    DuplicateProposal,
    #[error("Malformed message: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl MessageError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Stale { .. } | Self::Deferred { .. } | Self::SelfMessage | Self::DuplicateProposal => {
                Severity::Ignored
            }
            Self::TooFarAhead { .. }
            | Self::BufferFull
            | Self::NotProposer { .. }
            | Self::UnexpectedStep(_)
            | Self::Malformed(_) => Severity::Rejected,
            Self::UnknownSender(_) | Self::Vote(_) => Severity::Violation,
        }
    }

    pub fn is_violation(&self) -> bool {
        self.severity() == Severity::Violation
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VoteError {
    #[error("Replica {voter} equivocated in view {view}: {recorded} then {received}")]
    Equivocation {
        view: View,
        voter: ReplicaId,
        recorded: VoteValue,
        received: VoteValue,
    },
    #[error("{voters} distinct voters in view {view} with {replicas} replicas")]
    TooManyVoters {
        view: View,
        voters: usize,
        replicas: usize,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProposeError {
    #[error("Replica {expected} is the proposer for view {view}")]
    NotProposer { view: View, expected: ReplicaId },
    #[error("Can not propose in step {0:?}")]
    UnexpectedStep(Step),
}

#[cfg(test)]
mod tests {
    use crate::types::View;

    use super::{MessageError, Severity, VoteError};

    #[test]
    fn severities() {
        let view = View::new(1, 0);
        assert_eq!(
            MessageError::Stale {
                view,
                current: View::new(2, 0)
            }
            .severity(),
            Severity::Ignored
        );
        assert_eq!(
            MessageError::Malformed("missing block").severity(),
            Severity::Rejected
        );
        assert!(MessageError::UnknownSender(7).is_violation());
        assert!(MessageError::from(VoteError::TooManyVoters {
            view,
            voters: 5,
            replicas: 4
        })
        .is_violation());
    }
}
