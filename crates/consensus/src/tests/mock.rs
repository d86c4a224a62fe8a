use std::sync::{Arc, Mutex};
use std::time::Duration;

use babel_metrics::noop;
use babel_primitives::{ReplicaId, Transaction};
use tokio::sync::mpsc;

use crate::backend::{BlockExecutor, Broadcast};
use crate::config::Config;
use crate::engine::TendermintEngine;
use crate::event::Event;
use crate::messages::Message;
use crate::types::CommittedBlock;

/// Records everything the engine sends.
#[derive(Clone, Default)]
pub(crate) struct Outbox(Arc<Mutex<Vec<Message>>>);

impl Outbox {
    /// Removes and returns everything sent so far.
    pub(crate) fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl Broadcast for Outbox {
    fn broadcast(&self, message: Message) {
        self.0.lock().unwrap().push(message);
    }

    fn send(&self, _: ReplicaId, message: Message) {
        self.0.lock().unwrap().push(message);
    }
}

#[derive(Clone, Default)]
pub(crate) struct Ledger(Arc<Mutex<Vec<CommittedBlock>>>);

impl Ledger {
    pub(crate) fn committed(&self) -> Vec<CommittedBlock> {
        self.0.lock().unwrap().clone()
    }
}

impl BlockExecutor for Ledger {
    fn execute(&mut self, block: &CommittedBlock) {
        self.0.lock().unwrap().push(block.clone());
    }
}

pub(crate) type TestEngine = TendermintEngine<Outbox, Ledger>;

pub(crate) fn test_config(replicas: usize, id: ReplicaId) -> Config {
    Config {
        // Timers never fire on their own in these tests
        base_timeout: Duration::from_secs(3600),
        ..Config::new(replicas, id)
    }
}

pub(crate) struct Harness {
    pub(crate) engines: Vec<TestEngine>,
    pub(crate) outboxes: Vec<Outbox>,
    pub(crate) ledgers: Vec<Ledger>,
    _timeouts: mpsc::Receiver<Event>,
}

impl Harness {
    pub(crate) fn new(replicas: usize) -> Self {
        Self::with_config(replicas, |_| {})
    }

    pub(crate) fn with_config(replicas: usize, customize: impl Fn(&mut Config)) -> Self {
        let (events, timeouts) = mpsc::channel(1024);
        let mut engines = Vec::new();
        let mut outboxes = Vec::new();
        let mut ledgers = Vec::new();

        for id in 0..replicas as ReplicaId {
            let mut config = test_config(replicas, id);
            customize(&mut config);

            let outbox = Outbox::default();
            let ledger = Ledger::default();
            let engine = TendermintEngine::new(
                &config,
                events.clone(),
                outbox.clone(),
                ledger.clone(),
                noop(),
            )
            .unwrap();

            engines.push(engine);
            outboxes.push(outbox);
            ledgers.push(ledger);
        }

        Self {
            engines,
            outboxes,
            ledgers,
            _timeouts: timeouts,
        }
    }

    /// Single engine, without starting it.
    pub(crate) fn engine(replicas: usize, id: ReplicaId) -> (TestEngine, Outbox, Ledger) {
        let (events, _) = mpsc::channel(16);
        let outbox = Outbox::default();
        let ledger = Ledger::default();
        let engine = TendermintEngine::new(
            &test_config(replicas, id),
            events,
            outbox.clone(),
            ledger.clone(),
            noop(),
        )
        .unwrap();
        (engine, outbox, ledger)
    }

    pub(crate) fn submit_to_all(&mut self, tx: &Transaction) {
        for engine in &mut self.engines {
            engine.add_transaction(tx.clone()).unwrap();
        }
    }

    pub(crate) fn start(&mut self) {
        for engine in &mut self.engines {
            engine.start();
        }
    }

    /// Collects everything sent since the last call, tagged with its sender.
    pub(crate) fn collect(&self) -> Vec<(ReplicaId, Message)> {
        self.outboxes
            .iter()
            .enumerate()
            .flat_map(|(id, outbox)| {
                outbox
                    .take()
                    .into_iter()
                    .map(move |message| (id as ReplicaId, message))
            })
            .collect()
    }

    /// Delivers messages in waves, in send order, until every replica
    /// reached `height`. Panics if the network goes quiet before that.
    pub(crate) fn run_until_height(&mut self, height: u64) {
        for _ in 0..100 {
            if self.engines.iter().all(|e| e.state().height() >= height) {
                return;
            }

            let messages = self.collect();
            assert!(!messages.is_empty(), "no progress before height {height}");
            for (from, message) in messages {
                for engine in &mut self.engines {
                    if engine.id() != from {
                        let _ = engine.handle_message(from, message.clone());
                    }
                }
            }
        }
        panic!("height {height} not reached");
    }
}
