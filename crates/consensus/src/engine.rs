use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use babel_metrics::SharedMetrics;
use babel_primitives::{Block, BlockHash, ReplicaId, Transaction, TxHash};
use babel_txpool::{PoolError, TransactionPool};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{BlockExecutor, Broadcast};
use crate::config::{Config, ConfigError, DuplicateVotePolicy};
use crate::error::{MessageError, ProposeError, Severity};
use crate::event::Event;
use crate::messages::{FutureMessages, Message, Payload};
use crate::pacemaker::Pacemaker;
use crate::quorum::Quorum;
use crate::state::{ConsensusState, StateSnapshot};
use crate::types::{CommittedBlock, Step, View, VoteKind, VoteValue};
use crate::votes::VoteOutcome;

/// Tendermint state machine of a single replica.
///
/// Every entry point runs one event to completion. Votes and proposals the
/// engine produces itself are broadcast to peers and then applied locally
/// through the same rules as peer messages, before the entry point returns.
pub struct TendermintEngine<B, E>
where
    B: Broadcast,
    E: BlockExecutor,
{
    id: ReplicaId,
    quorum: Quorum,
    vote_policy: DuplicateVotePolicy,
    max_block_transactions: usize,
    state: ConsensusState,
    pacemaker: Pacemaker,
    /// Messages for views not reached yet.
    future: FutureMessages,
    /// Messages to apply before the current entry point returns.
    backlog: VecDeque<(ReplicaId, Message)>,
    /// Proposed blocks of the current height, by hash.
    known_blocks: HashMap<BlockHash, Arc<Block>>,
    txpool: TransactionPool,
    broadcast: B,
    executor: E,
    metrics: SharedMetrics,
    height_started: Instant,
    protocol_violations: u64,
}

impl<B, E> TendermintEngine<B, E>
where
    B: Broadcast,
    E: BlockExecutor,
{
    /// Creates the engine. Timeouts armed by its pacemaker are delivered to `events`.
    pub fn new(
        config: &Config,
        events: mpsc::Sender<Event>,
        broadcast: B,
        executor: E,
        metrics: SharedMetrics,
    ) -> Result<Self, ConfigError> {
        let quorum = config.validate()?;

        Ok(Self {
            id: config.replica_id,
            quorum,
            vote_policy: config.duplicate_votes,
            max_block_transactions: config.max_block_transactions,
            state: ConsensusState::new(config.initial_height),
            pacemaker: Pacemaker::new(config, events, metrics.clone()),
            future: FutureMessages::new(config.future_message_capacity),
            backlog: VecDeque::new(),
            known_blocks: HashMap::new(),
            txpool: TransactionPool::new(config.txpool.clone()),
            broadcast,
            executor,
            metrics,
            height_started: Instant::now(),
            protocol_violations: 0,
        })
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn quorum(&self) -> Quorum {
        self.quorum
    }

    pub fn state(&self) -> &ConsensusState {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(&self.state, self.protocol_violations)
    }

    pub fn pacemaker(&self) -> &Pacemaker {
        &self.pacemaker
    }

    pub fn txpool(&self) -> &TransactionPool {
        &self.txpool
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations
    }

    /// Enters the initial view: arms its timeout and proposes if this
    /// replica is its proposer.
    pub fn start(&mut self) {
        info!(
            replica = self.id,
            height = self.state.height(),
            replicas = self.quorum.replicas(),
            quorum = self.quorum.threshold(),
            "Starting consensus"
        );
        self.height_started = Instant::now();
        self.start_round();
        self.drain_backlog();
    }

    /// Validates and applies one message received from `sender`.
    ///
    /// Rejected messages leave the state untouched. Errors are already logged
    /// and counted when returned.
    pub fn handle_message(
        &mut self,
        sender: ReplicaId,
        message: Message,
    ) -> Result<(), MessageError> {
        self.drain_backlog();

        let result = if sender as usize >= self.quorum.replicas() {
            Err(MessageError::UnknownSender(sender))
        } else if sender == self.id {
            Err(MessageError::SelfMessage)
        } else {
            self.process(sender, message)
        };

        match &result {
            Ok(()) => self.metrics.increment("message_processed"),
            Err(err) => self.record_rejection(sender, err),
        }
        self.drain_backlog();

        result
    }

    /// Applies a timeout armed for `view`. Returns false when the replica
    /// already left that view.
    pub fn handle_timeout(&mut self, view: View) -> bool {
        self.drain_backlog();
        if view != self.state.view() {
            debug!(%view, current = %self.state.view(), "Ignoring stale timeout");
            self.metrics.increment("timeout_stale");
            return false;
        }

        info!(
            height = view.height,
            round = view.round,
            step = ?self.state.step(),
            "Round timed out"
        );
        self.metrics.increment("round_timeout");

        self.state.advance_round();
        self.cast_vote(VoteKind::Prevote, VoteValue::Nil);
        self.start_round();
        self.drain_backlog();

        true
    }

    /// Proposes a block built from `candidates` for the current view.
    ///
    /// A block that already reached prevote quorum in this height is proposed
    /// again instead, when its body is known.
    pub fn on_new_height_transactions(
        &mut self,
        candidates: Vec<Transaction>,
    ) -> Result<Arc<Block>, ProposeError> {
        self.drain_backlog();
        let block = self.try_propose(candidates)?;
        self.drain_backlog();
        Ok(block)
    }

    /// Adds a transaction to the pool proposals are built from.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<TxHash, PoolError> {
        self.drain_backlog();
        let result = self.txpool.add_transaction(transaction);
        match &result {
            Ok(hash) => {
                debug!(tx = %hash.short(), pending = self.txpool.len(), "Transaction added to pool");
                self.metrics.increment("transaction_received");
            }
            Err(PoolError::AlreadyPending(_)) => {}
            Err(err) => {
                warn!(%err, "Transaction dropped");
                self.metrics.increment("transaction_dropped");
            }
        }
        result
    }

    fn process(&mut self, sender: ReplicaId, message: Message) -> Result<(), MessageError> {
        let current = self.state.view();
        let view = message.view;

        if view.height > current.height.saturating_add(1) {
            return Err(MessageError::TooFarAhead { view, current });
        }

        if matches!(message.payload, Payload::Precommit(_)) {
            // Precommits count in any round of the current height
            if view.height < current.height {
                return Err(MessageError::Stale { view, current });
            }
        } else if view < current {
            return Err(MessageError::Stale { view, current });
        } else if view > current {
            self.future.push(sender, message)?;
            return Err(MessageError::Deferred { view });
        }

        match message.payload {
            Payload::Propose(block) => self.on_propose(sender, view, block),
            Payload::Prevote(value) => self.on_prevote(sender, view, value),
            Payload::Precommit(value) => self.on_precommit(sender, view, value),
        }
    }

    fn on_propose(
        &mut self,
        sender: ReplicaId,
        view: View,
        block: Option<Arc<Block>>,
    ) -> Result<(), MessageError> {
        let expected = self.pacemaker.proposer_for(view);
        if sender != expected {
            return Err(MessageError::NotProposer { sender, expected });
        }
        let Some(block) = block else {
            return Err(MessageError::Malformed("proposal without block"));
        };

        let hash = block.hash();
        self.known_blocks
            .entry(hash)
            .or_insert_with(|| block.clone());

        let step = self.state.step();
        if step != Step::Propose {
            if self
                .state
                .proposal()
                .is_some_and(|proposal| proposal.hash() == hash)
            {
                return Err(MessageError::DuplicateProposal);
            }
            return Err(MessageError::UnexpectedStep(step));
        }

        let value = match self.state.locked() {
            Some(locked) if locked.value != hash => {
                debug!(
                    locked = %locked.value.short(),
                    locked_round = locked.round,
                    "Locked on a different block, prevoting nil"
                );
                VoteValue::Nil
            }
            _ => VoteValue::Block(hash),
        };

        debug!(
            height = view.height,
            round = view.round,
            proposer = sender,
            block = %hash.short(),
            transactions = block.transactions().len(),
            "Accepted proposal"
        );
        self.metrics.increment("proposal_accepted");

        self.state.set_proposal(block);
        self.state.set_step(Step::Prevote);
        self.cast_vote(VoteKind::Prevote, value);

        Ok(())
    }

    fn on_prevote(
        &mut self,
        sender: ReplicaId,
        view: View,
        value: VoteValue,
    ) -> Result<(), MessageError> {
        if self.record_vote(VoteKind::Prevote, view, sender, value)? == VoteOutcome::Duplicate {
            return Ok(());
        }

        let Some(polka) = self
            .state
            .prevotes()
            .quorum_value(view, self.quorum.threshold())
        else {
            return Ok(());
        };

        if let VoteValue::Block(hash) = polka {
            self.state.set_valid(hash, view.round);
        }
        if self.state.step() != Step::Prevote {
            return Ok(());
        }

        match polka {
            VoteValue::Block(hash) => {
                info!(
                    height = view.height,
                    round = view.round,
                    block = %hash.short(),
                    "Prevote quorum reached, locking block"
                );
                self.state.lock(hash);
            }
            VoteValue::Nil => {
                info!(
                    height = view.height,
                    round = view.round,
                    "Prevote quorum for nil"
                );
            }
        }
        self.state.set_step(Step::Precommit);
        self.cast_vote(VoteKind::Precommit, polka);

        Ok(())
    }

    fn on_precommit(
        &mut self,
        sender: ReplicaId,
        view: View,
        value: VoteValue,
    ) -> Result<(), MessageError> {
        if self.record_vote(VoteKind::Precommit, view, sender, value)? == VoteOutcome::Duplicate {
            return Ok(());
        }

        if view.height == self.state.height() {
            if value.is_nil()
                && self
                    .state
                    .precommits()
                    .count(view, VoteValue::Nil)
                    == self.quorum.threshold()
            {
                debug!(%view, "Precommit quorum for nil, waiting for round timeout");
            }
            self.try_decide();
        }

        Ok(())
    }

    fn record_vote(
        &mut self,
        kind: VoteKind,
        view: View,
        voter: ReplicaId,
        value: VoteValue,
    ) -> Result<VoteOutcome, MessageError> {
        // Our own votes may legitimately change within a round
        let policy = if voter == self.id {
            DuplicateVotePolicy::Overwrite
        } else {
            self.vote_policy
        };
        let replicas = self.quorum.replicas();
        let book = match kind {
            VoteKind::Prevote => self.state.prevotes_mut(),
            VoteKind::Precommit => self.state.precommits_mut(),
        };

        let outcome = book.insert(view, voter, value, policy, replicas)?;
        if let VoteOutcome::Replaced(previous) = outcome {
            debug!(%view, voter, ?kind, %previous, %value, "Vote replaced");
        }
        Ok(outcome)
    }

    /// Commits the current height if some round gathered a precommit quorum.
    fn try_decide(&mut self) {
        let height = self.state.height();
        if let Some((round, hash)) = self
            .state
            .precommits()
            .decision(height, self.quorum.threshold())
        {
            self.commit(round, hash);
        }
    }

    fn commit(&mut self, round: u32, hash: BlockHash) {
        let height = self.state.height();
        let block = self.known_blocks.get(&hash).cloned();
        if block.is_none() {
            warn!(height, round, block = %hash.short(), "Committing block whose body was never received");
        }

        let committed = CommittedBlock {
            height,
            round,
            hash,
            block,
        };
        self.executor.execute(&committed);

        let mut transactions = 0;
        if let Some(block) = &committed.block {
            let now = SystemTime::now();
            for tx in block.transactions() {
                self.metrics.increment("transaction_committed");
                self.metrics.record_latency("transaction_latency", tx.age(now));
            }
            transactions = block.transactions().len();
            self.txpool.remove_committed(block.transactions());
        }
        self.metrics.increment("block_committed");
        self.metrics
            .record_latency("commit_latency", self.height_started.elapsed());

        info!(
            height,
            round,
            block = %hash.short(),
            transactions,
            pending = self.txpool.len(),
            "Committed block"
        );

        self.pacemaker.cancel();
        self.advance_height();
    }

    fn advance_height(&mut self) {
        self.state.advance_height();
        self.known_blocks.clear();
        self.future.prune(self.state.height());
        self.height_started = Instant::now();
        self.start_round();
    }

    /// Enters the current view: arms its timeout, proposes when it is our
    /// turn and replays messages buffered for it.
    fn start_round(&mut self) {
        let view = self.state.view();
        debug!(height = view.height, round = view.round, "Entering round");
        self.pacemaker.arm_timeout(view);

        if self.pacemaker.proposer_for(view) == self.id {
            let candidates = self.txpool.best_transactions(self.max_block_transactions);
            if let Err(err) = self.try_propose(candidates) {
                warn!(%err, %view, "Failed to propose");
            }
        }

        let buffered = self.future.take(view);
        if !buffered.is_empty() {
            debug!(%view, messages = buffered.len(), "Replaying buffered messages");
            self.backlog.extend(buffered);
        }

        // Precommits for this height may have arrived before we got here
        self.try_decide();
    }

    fn try_propose(&mut self, mut candidates: Vec<Transaction>) -> Result<Arc<Block>, ProposeError> {
        let view = self.state.view();
        let expected = self.pacemaker.proposer_for(view);
        if expected != self.id {
            return Err(ProposeError::NotProposer { view, expected });
        }
        if self.state.step() != Step::Propose {
            return Err(ProposeError::UnexpectedStep(self.state.step()));
        }

        let valid_block = self
            .state
            .valid()
            .and_then(|valid| self.known_blocks.get(&valid.value))
            .cloned();
        let block = match valid_block {
            Some(block) => {
                debug!(%view, block = %block.hash().short(), "Proposing valid block again");
                block
            }
            None => {
                candidates.truncate(self.max_block_transactions);
                Arc::new(Block::new(self.id, candidates))
            }
        };

        info!(
            height = view.height,
            round = view.round,
            block = %block.hash().short(),
            transactions = block.transactions().len(),
            "Proposing block"
        );
        self.metrics.increment("proposal_sent");

        let message = Message::propose(view, block.clone());
        self.broadcast.broadcast(message.clone());
        self.backlog.push_back((self.id, message));

        Ok(block)
    }

    /// Broadcasts our vote for the current view and queues it for local accounting.
    fn cast_vote(&mut self, kind: VoteKind, value: VoteValue) {
        let view = self.state.view();
        let message = match kind {
            VoteKind::Prevote => {
                self.metrics.increment("prevote_sent");
                Message::prevote(view, value)
            }
            VoteKind::Precommit => {
                self.metrics.increment("precommit_sent");
                Message::precommit(view, value)
            }
        };

        debug!(%view, ?kind, %value, "Casting vote");
        self.broadcast.broadcast(message.clone());
        self.backlog.push_back((self.id, message));
    }

    /// Applies queued messages, including those replayed for a view entered
    /// along the way. A replica able to decide alone stops after one commit
    /// and keeps the rest queued for the next entry point.
    fn drain_backlog(&mut self) {
        let height = self.state.height();
        let decides_alone = self.quorum.threshold() == 1;
        while !decides_alone || self.state.height() == height {
            let Some((sender, message)) = self.backlog.pop_front() else {
                break;
            };
            let kind = message.kind();
            if let Err(err) = self.process(sender, message) {
                if sender == self.id {
                    debug!(%err, %kind, "Own message not applied");
                } else {
                    self.record_rejection(sender, &err);
                }
            }
        }
    }

    fn record_rejection(&mut self, sender: ReplicaId, err: &MessageError) {
        match err.severity() {
            Severity::Ignored => {
                match err {
                    MessageError::Stale { .. } => self.metrics.increment("message_stale"),
                    MessageError::Deferred { .. } => self.metrics.increment("message_deferred"),
                    _ => self.metrics.increment("message_ignored"),
                }
                debug!(sender, %err, "Ignoring message");
            }
            Severity::Rejected => {
                warn!(sender, %err, "Rejected message");
                self.metrics.increment("message_rejected");
            }
            Severity::Violation => {
                self.protocol_violations += 1;
                error!(
                    sender,
                    %err,
                    violations = self.protocol_violations,
                    "Protocol violation"
                );
                self.metrics.increment("protocol_violation");
            }
        }
    }
}
