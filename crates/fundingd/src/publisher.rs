//! Downstream consumer that writes every published opportunity to the log as JSON.

use std::pin::Pin;

use color_eyre::eyre::{self, WrapErr as _};
use funding_core::signals::OpportunityEvent;
use tokio::{select, sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub(crate) struct Builder {
    pub(crate) events: broadcast::Receiver<OpportunityEvent>,
    pub(crate) shutdown_token: CancellationToken,
}

impl Builder {
    pub(crate) fn build(self) -> Handle {
        let Builder {
            events,
            shutdown_token,
        } = self;

        let worker = Worker {
            events,
            shutdown_token: shutdown_token.clone(),
        };
        let worker_handle = tokio::spawn(async move { worker.run().await });

        Handle {
            shutdown_token,
            worker_handle: Some(worker_handle),
        }
    }
}

pub(crate) struct Handle {
    shutdown_token: CancellationToken,
    worker_handle: Option<JoinHandle<eyre::Result<()>>>,
}

impl Handle {
    pub(crate) async fn shutdown(&mut self) -> eyre::Result<()> {
        self.shutdown_token.cancel();
        let Some(task) = self.worker_handle.take() else {
            return Ok(());
        };
        crate::flatten_join_result(task.await)
    }
}

impl Future for Handle {
    type Output = eyre::Result<()>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        use futures::future::FutureExt as _;

        let task = self
            .worker_handle
            .as_mut()
            .expect("publisher handle must not be polled after shutdown");
        let result = std::task::ready!(task.poll_unpin(cx));
        self.worker_handle = None;
        std::task::Poll::Ready(crate::flatten_join_result(result))
    }
}

struct Worker {
    events: broadcast::Receiver<OpportunityEvent>,
    shutdown_token: CancellationToken,
}

impl Worker {
    #[instrument(name = "opportunity_publisher", skip_all)]
    async fn run(mut self) -> eyre::Result<()> {
        info!("starting opportunity publisher");

        loop {
            select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    let drained = self.drain()?;
                    info!(drained, "publisher received shutdown signal");
                    break Ok(());
                }

                received = self.events.recv() => match received {
                    Ok(event) => log_event(&event)?,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "publisher fell behind, dropped opportunities");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("opportunity channel closed");
                        break Err(eyre::eyre!("opportunity channel closed"));
                    }
                },
            }
        }
    }

    /// Logs whatever is still buffered without waiting for more.
    fn drain(&mut self) -> eyre::Result<usize> {
        let mut drained = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    log_event(&event)?;
                    drained += 1;
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "publisher fell behind, dropped opportunities");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break Ok(drained),
            }
        }
    }
}

fn log_event(event: &OpportunityEvent) -> eyre::Result<()> {
    let json = serde_json::to_string(event).wrap_err("failed to serialize opportunity")?;
    info!(
        instrument = %event.instrument,
        direction = %event.scenario.direction,
        best_apy = event.scenario.best_apy(),
        opportunity = %json,
        "💸 funding opportunity"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use funding_core::{
        signals::{BroadcastSink, PublishSink as _},
        state::VenueSnapshot,
        strategy::{self, FeeSchedule},
        venue::Venue,
    };

    use super::*;

    fn event() -> OpportunityEvent {
        OpportunityEvent {
            instrument: "BTC".into(),
            timestamp: Utc::now(),
            venue_a: Venue::Hyperliquid,
            snapshot_a: Arc::new(VenueSnapshot::with_funding_rate(0.0013)),
            venue_b: Venue::Lighter,
            snapshot_b: Arc::new(VenueSnapshot::with_funding_rate(0.0106)),
            scenario: strategy::evaluate(300_000.0, 0.0013, 0.0106, &FeeSchedule::default())
                .unwrap(),
        }
    }

    #[test]
    fn degenerate_events_still_serialize() {
        let mut event = event();
        event.scenario =
            strategy::evaluate(300_000.0, 0.01, 0.01, &FeeSchedule::default()).unwrap();
        assert!(log_event(&event).is_ok());
    }

    #[tokio::test]
    async fn keeps_consuming_until_shutdown() {
        let sink = BroadcastSink::new(4);
        let mut handle = Builder {
            events: sink.subscribe(),
            shutdown_token: CancellationToken::new(),
        }
        .build();

        for _ in 0..10 {
            sink.publish(event()).unwrap();
        }
        tokio::task::yield_now().await;

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn buffered_events_are_logged_on_shutdown() {
        let sink = BroadcastSink::new(8);
        let mut worker = Worker {
            events: sink.subscribe(),
            shutdown_token: CancellationToken::new(),
        };

        for _ in 0..3 {
            sink.publish(event()).unwrap();
        }
        assert_eq!(worker.drain().unwrap(), 3);
        assert_eq!(worker.drain().unwrap(), 0);

        // cancelled with an event still queued: run drains it and returns
        sink.publish(event()).unwrap();
        worker.shutdown_token.cancel();
        assert!(worker.run().await.is_ok());
    }

    #[tokio::test]
    async fn closed_channel_ends_the_worker_with_an_error() {
        let sink = BroadcastSink::new(4);
        let handle = Builder {
            events: sink.subscribe(),
            shutdown_token: CancellationToken::new(),
        }
        .build();

        drop(sink);
        assert!(handle.await.is_err());
    }
}
