use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use babel_metrics::SharedMetrics;
use babel_primitives::ReplicaId;
use tracing::{debug, warn};

use crate::config::Config;
use crate::{DeliveryError, InboundHandle, Routable, Transport};

type Peers<M> = HashMap<ReplicaId, Arc<dyn InboundHandle<M>>>;

/// In-memory transport connecting replicas that run in the same process.
///
/// The peer table is the only state shared between replicas, so it sits
/// behind a lock. Delayed deliveries run on their own tokio tasks and must
/// therefore be issued from within a runtime.
pub struct LocalTransport<M> {
    config: Config,
    peers: RwLock<Peers<M>>,
    metrics: SharedMetrics,
}

impl<M> LocalTransport<M>
where
    M: Routable,
{
    pub fn new(config: Config, metrics: SharedMetrics) -> Self {
        Self {
            config,
            peers: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn registered(&self) -> usize {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn deliver(&self, recipient: ReplicaId, handle: Arc<dyn InboundHandle<M>>, message: M) {
        let delay = self.config.sample_delay();
        if delay.is_zero() {
            deliver_now(recipient, handle.as_ref(), message, &self.metrics);
            return;
        }

        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            deliver_now(recipient, handle.as_ref(), message, &metrics);
        });
    }
}

impl<M> Transport<M> for LocalTransport<M>
where
    M: Routable,
{
    fn broadcast(&self, message: M) {
        let peers = self.peers.read().unwrap_or_else(PoisonError::into_inner);
        let sender = message.sender();
        for (&recipient, handle) in peers.iter() {
            if recipient == sender {
                continue;
            }
            self.deliver(recipient, handle.clone(), message.clone());
        }
    }

    fn send(&self, recipient: ReplicaId, message: M) {
        let handle = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&recipient)
            .cloned();
        match handle {
            Some(handle) => self.deliver(recipient, handle, message),
            None => {
                warn!(recipient, "Attempted to send message to unregistered replica");
                self.metrics.increment("message_unroutable");
            }
        }
    }

    fn register_inbound(&self, replica: ReplicaId, handle: Arc<dyn InboundHandle<M>>) {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(replica, handle);
        debug!(replica, "Registered inbound handle");
    }
}

fn deliver_now<M: 'static>(
    recipient: ReplicaId,
    handle: &dyn InboundHandle<M>,
    message: M,
    metrics: &SharedMetrics,
) {
    match handle.deliver(message) {
        Ok(()) => metrics.increment("message_delivered"),
        Err(DeliveryError::QueueFull) => {
            warn!(recipient, "Inbound queue full, dropping message");
            metrics.increment("message_dropped");
        }
        Err(DeliveryError::Closed) => {
            debug!(recipient, "Inbound queue closed, dropping message");
            metrics.increment("message_undeliverable");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use babel_metrics::{Collector, SharedMetrics};
    use babel_primitives::ReplicaId;
    use tokio::sync::mpsc;

    use crate::config::Config;
    use crate::{DeliveryError, InboundHandle, Routable, Transport};

    use super::LocalTransport;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping {
        from: ReplicaId,
        seq: u64,
    }

    impl Routable for Ping {
        fn sender(&self) -> ReplicaId {
            self.from
        }
    }

    struct Inbox(mpsc::Sender<Ping>);

    impl InboundHandle<Ping> for Inbox {
        fn deliver(&self, message: Ping) -> Result<(), DeliveryError> {
            self.0.try_send(message).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
        }
    }

    fn transport_with(
        config: Config,
        replicas: u32,
        capacity: usize,
    ) -> (
        LocalTransport<Ping>,
        Vec<mpsc::Receiver<Ping>>,
        Arc<Collector>,
    ) {
        let collector = Arc::new(Collector::new());
        let metrics: SharedMetrics = collector.clone();
        let transport = LocalTransport::new(config, metrics);
        let receivers = (0..replicas)
            .map(|id| {
                let (tx, rx) = mpsc::channel(capacity);
                transport.register_inbound(id, Arc::new(Inbox(tx)));
                rx
            })
            .collect();
        (transport, receivers, collector)
    }

    #[test]
    fn broadcast_skips_sender() {
        let (transport, mut receivers, _) = transport_with(Config::default(), 3, 8);
        assert_eq!(transport.registered(), 3);

        let ping = Ping { from: 1, seq: 7 };
        transport.broadcast(ping.clone());

        assert_eq!(receivers[0].try_recv().unwrap(), ping);
        assert!(receivers[1].try_recv().is_err());
        assert_eq!(receivers[2].try_recv().unwrap(), ping);
    }

    #[test]
    fn send_to_single_replica() {
        let (transport, mut receivers, collector) = transport_with(Config::default(), 3, 8);

        let ping = Ping { from: 0, seq: 1 };
        transport.send(2, ping.clone());
        assert_eq!(receivers[2].try_recv().unwrap(), ping);
        assert!(receivers[1].try_recv().is_err());

        // Unregistered recipient
        transport.send(9, ping);
        assert_eq!(collector.counter("message_unroutable"), 1);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (transport, mut receivers, collector) = transport_with(Config::default(), 2, 1);

        transport.send(1, Ping { from: 0, seq: 1 });
        transport.send(1, Ping { from: 0, seq: 2 });

        assert_eq!(receivers[1].try_recv().unwrap().seq, 1);
        assert!(receivers[1].try_recv().is_err());
        assert_eq!(collector.counter("message_delivered"), 1);
        assert_eq!(collector.counter("message_dropped"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_delivery() {
        let config = Config::with_delay(Duration::from_millis(10), Duration::from_millis(10));
        let (transport, mut receivers, _) = transport_with(config, 2, 8);

        transport.send(1, Ping { from: 0, seq: 1 });
        assert!(receivers[1].try_recv().is_err());

        let ping = tokio::time::timeout(Duration::from_millis(50), receivers[1].recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ping.seq, 1);
    }
}
