use std::time::Duration;

use babel_metrics::SharedMetrics;
use babel_primitives::ReplicaId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::{Config, ProposerRotation};
use crate::event::Event;
use crate::types::View;

/// Round timeouts stop growing after `2^6` times the base timeout.
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Liveness driver of a replica. Selects proposers and keeps a single round
/// timer. An expired timer only enqueues [`Event::Timeout`] tagged with the
/// view it was armed for; it never touches consensus state.
pub struct Pacemaker {
    replica_count: usize,
    rotation: ProposerRotation,
    base_timeout: Duration,
    events: mpsc::Sender<Event>,
    metrics: SharedMetrics,
    pending: Option<(View, JoinHandle<()>)>,
}

impl Pacemaker {
    pub fn new(config: &Config, events: mpsc::Sender<Event>, metrics: SharedMetrics) -> Self {
        Self {
            replica_count: config.replica_count,
            rotation: config.proposer_rotation,
            base_timeout: config.base_timeout,
            events,
            metrics,
            pending: None,
        }
    }

    pub fn proposer_for(&self, view: View) -> ReplicaId {
        let n = self.replica_count as u64;
        let slot = match self.rotation {
            ProposerRotation::RoundOnly => view.round as u64 % n,
            ProposerRotation::HeightAndRound => (view.height % n + view.round as u64 % n) % n,
        };
        slot as ReplicaId
    }

    pub fn timeout_for(&self, round: u32) -> Duration {
        self.base_timeout * (1 << round.min(MAX_BACKOFF_EXPONENT))
    }

    /// Starts the timer for `view`, replacing any pending one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm_timeout(&mut self, view: View) {
        self.cancel();

        let timeout = self.timeout_for(view.round);
        let events = self.events.clone();
        let metrics = self.metrics.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            metrics.increment("timeout_fired");
            // Closed queue means the replica stopped
            if events.send(Event::Timeout(view)).await.is_err() {
                trace!(%view, "Timeout fired after replica stopped");
            }
        });

        debug!(%view, ?timeout, "Armed round timeout");
        self.pending = Some((view, task));
    }

    /// Stops the pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some((view, task)) = self.pending.take() {
            task.abort();
            trace!(%view, "Cancelled round timeout");
        }
    }

    /// View of the pending timer.
    pub fn armed_for(&self) -> Option<View> {
        self.pending
            .as_ref()
            .filter(|(_, task)| !task.is_finished())
            .map(|(view, _)| *view)
    }
}

impl Drop for Pacemaker {
    fn drop(&mut self) {
        self.cancel();
    }
}
