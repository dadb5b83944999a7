use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Utc};
use color_eyre::eyre::{self, eyre};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    instrument::InstrumentId,
    state::VenueSnapshot,
    strategy::ArbitrageScenario,
    venue::Venue,
};

/// An evaluated cross-venue funding opportunity, ready for downstream subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct OpportunityEvent {
    pub instrument: InstrumentId,
    pub timestamp: DateTime<Utc>,
    pub venue_a: Venue,
    pub snapshot_a: Arc<VenueSnapshot>,
    pub venue_b: Venue,
    pub snapshot_b: Arc<VenueSnapshot>,
    pub scenario: ArbitrageScenario,
}

impl Display for OpportunityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{} {} / {} {}] {}",
            self.instrument,
            self.venue_a,
            self.snapshot_a.funding_rate,
            self.venue_b,
            self.snapshot_b.funding_rate,
            self.scenario,
        )
    }
}

/// Fan-out boundary for opportunity events.
///
/// Events are handed over exactly once; retries and de-duplication are the sink's concern.
pub trait PublishSink: Send + Sync {
    fn publish(&self, event: OpportunityEvent) -> eyre::Result<()>;
}

/// [`PublishSink`] over a tokio broadcast channel, so any number of transports can
/// subscribe to the same event stream.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<OpportunityEvent>,
}

impl BroadcastSink {
    /// `capacity` is clamped to at least one buffered event.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OpportunityEvent> {
        self.tx.subscribe()
    }
}

impl PublishSink for BroadcastSink {
    fn publish(&self, event: OpportunityEvent) -> eyre::Result<()> {
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|e| eyre!("no subscribers for opportunity on {}", e.0.instrument))
    }
}
