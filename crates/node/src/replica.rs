use std::mem;
use std::sync::Arc;

use babel_consensus::{
    BlockExecutor, Config, ConfigError, ConsensusMessage, Event, StateSnapshot, TendermintEngine,
};
use babel_metrics::SharedMetrics;
use babel_network::{DeliveryError, InboundHandle, Transport};
use babel_primitives::ReplicaId;
use tokio::select;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::outbound::Outbound;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Event queue of the replica is full")]
    QueueFull,
    #[error("Replica is stopped")]
    Stopped,
}

/// Producer side of a replica's event queue. Network deliveries, client
/// submissions and the pacemaker all end up here. Never blocks.
#[derive(Clone)]
pub struct EventSender {
    replica: ReplicaId,
    events: mpsc::Sender<Event>,
    metrics: SharedMetrics,
}

impl EventSender {
    pub(crate) fn new(replica: ReplicaId, events: mpsc::Sender<Event>, metrics: SharedMetrics) -> Self {
        Self {
            replica,
            events,
            metrics,
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    pub fn submit(&self, event: impl Into<Event>) -> Result<(), SubmitError> {
        match self.events.try_send(event.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(replica = self.replica, "Event queue full, dropping event");
                self.metrics.increment("event_dropped");
                Err(SubmitError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SubmitError::Stopped),
        }
    }
}

impl InboundHandle<ConsensusMessage> for EventSender {
    fn deliver(&self, message: ConsensusMessage) -> Result<(), DeliveryError> {
        self.submit(message).map_err(|err| match err {
            SubmitError::QueueFull => DeliveryError::QueueFull,
            SubmitError::Stopped => DeliveryError::Closed,
        })
    }
}

/// One consensus participant: the engine plus the task that feeds it events.
pub struct Replica<T, E>
where
    T: Transport<ConsensusMessage>,
    E: BlockExecutor,
{
    id: ReplicaId,
    sender: EventSender,
    snapshot: watch::Receiver<StateSnapshot>,
    lifecycle: Lifecycle<T, E>,
}

enum Lifecycle<T, E>
where
    T: Transport<ConsensusMessage>,
    E: BlockExecutor,
{
    Ready(EventLoop<T, E>),
    Running {
        cancel: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
    Stopped,
}

impl<T, E> Replica<T, E>
where
    T: Transport<ConsensusMessage>,
    E: BlockExecutor,
{
    /// Builds the replica and registers it with `transport`. Messages that
    /// arrive before [`Replica::start`] wait in the event queue.
    pub fn new(
        config: &Config,
        transport: Arc<T>,
        executor: E,
        metrics: SharedMetrics,
    ) -> Result<Self, ConfigError> {
        // Channel construction panics on a zero capacity
        config.validate()?;

        let id = config.replica_id;
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
        let outbound = Outbound::new(id, transport.clone());
        let engine = TendermintEngine::new(
            config,
            events_tx.clone(),
            outbound,
            executor,
            metrics.clone(),
        )?;

        let sender = EventSender::new(id, events_tx, metrics.clone());
        transport.register_inbound(id, Arc::new(sender.clone()));

        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

        Ok(Self {
            id,
            sender,
            snapshot: snapshot_rx,
            lifecycle: Lifecycle::Ready(EventLoop {
                engine,
                events: events_rx,
                snapshot: snapshot_tx,
                metrics,
            }),
        })
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn submit(&self, event: impl Into<Event>) -> Result<(), SubmitError> {
        self.sender.submit(event)
    }

    /// Latest state published by the event loop.
    pub fn snapshot(&self) -> StateSnapshot {
        *self.snapshot.borrow()
    }

    /// Notified whenever a processed event changed the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running { .. })
    }

    /// Spawns the event loop. Does nothing when already started or stopped.
    pub fn start(&mut self) {
        match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Ready(event_loop) => {
                let (cancel, cancel_rx) = oneshot::channel();
                let task = tokio::spawn(event_loop.run(cancel_rx));
                self.lifecycle = Lifecycle::Running { cancel, task };
            }
            lifecycle => {
                warn!(replica = self.id, "Replica already started");
                self.lifecycle = lifecycle;
            }
        }
    }

    /// Stops the event loop and waits for it to exit. Events still queued are
    /// discarded. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        match mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Ready(event_loop) => {
                drop(event_loop);
                info!(replica = self.id, "Replica stopped before start");
            }
            Lifecycle::Running { cancel, task } => {
                let _ = cancel.send(());
                if let Err(err) = task.await {
                    error!(replica = self.id, %err, "Replica task failed");
                }
            }
            Lifecycle::Stopped => {}
        }
    }
}

struct EventLoop<T, E>
where
    T: Transport<ConsensusMessage>,
    E: BlockExecutor,
{
    engine: TendermintEngine<Outbound<T>, E>,
    events: mpsc::Receiver<Event>,
    snapshot: watch::Sender<StateSnapshot>,
    metrics: SharedMetrics,
}

impl<T, E> EventLoop<T, E>
where
    T: Transport<ConsensusMessage>,
    E: BlockExecutor,
{
    async fn run(mut self, mut cancel: oneshot::Receiver<()>) {
        let replica = self.engine.id();
        self.engine.start();
        self.publish();

        loop {
            select! {
                biased;
                _ = &mut cancel => {
                    info!(replica, "Received stop signal");
                    break;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.dispatch(event),
                        None => break,
                    }
                }
            }
        }

        self.events.close();
        let mut discarded = 0usize;
        while self.events.try_recv().is_ok() {
            discarded += 1;
        }
        info!(
            replica,
            height = self.engine.state().height(),
            discarded,
            "Replica stopped"
        );
    }

    fn dispatch(&mut self, event: Event) {
        let started = Instant::now();
        match event {
            Event::Message(ConsensusMessage { from, message }) => {
                // Rejections are logged and counted by the engine
                let _ = self.engine.handle_message(from, message);
            }
            Event::Transaction(tx) => {
                let _ = self.engine.add_transaction(tx);
            }
            Event::Timeout(view) => {
                if self.engine.handle_timeout(view) {
                    debug!(replica = self.engine.id(), %view, "Applied timeout");
                }
            }
        }
        self.metrics
            .record_latency("event_processing", started.elapsed());
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.engine.snapshot();
        self.snapshot.send_if_modified(|current| {
            let changed = *current != snapshot;
            *current = snapshot;
            changed
        });
    }
}
