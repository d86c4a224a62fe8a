pub mod config;
pub mod local;

use std::sync::Arc;

use babel_primitives::ReplicaId;

pub use config::Config;
pub use local::LocalTransport;

/// Messages the transport can route. The sender is stamped by the replica
/// before the message is handed to the transport.
pub trait Routable: Clone + Send + Sync + 'static {
    fn sender(&self) -> ReplicaId;
}

/// Receiving side of a replica. Delivery must never block the caller.
pub trait InboundHandle<M>: Send + Sync + 'static {
    fn deliver(&self, message: M) -> Result<(), DeliveryError>;
}

/// Contract between a replica and the network. Both send operations are
/// fire-and-forget: they hand the message off and return immediately.
pub trait Transport<M>: Send + Sync + 'static
where
    M: Routable,
{
    /// Delivers the message to every registered replica except its sender.
    fn broadcast(&self, message: M);

    /// Delivers the message to exactly one replica.
    fn send(&self, recipient: ReplicaId, message: M);

    /// Associates a replica with the handle receiving messages addressed to it.
    /// Messages for a replica are dropped until it is registered.
    fn register_inbound(&self, replica: ReplicaId, handle: Arc<dyn InboundHandle<M>>);
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Inbound queue is full")]
    QueueFull,
    #[error("Inbound queue is closed")]
    Closed,
}
