//! Rate-gated opportunity scanning.
//!
//! The scheduler is woken by collector updates and by a periodic timer. A wake-up only
//! turns into a scan when at least `min_interval` has passed since the previous scan.
//! One worker task owns the gate, so at most one scan is ever in flight.

use std::{pin::Pin, sync::Arc, time::Duration};

use chrono::Utc;
use color_eyre::eyre::{self, WrapErr as _};
use tokio::{
    select,
    sync::Notify,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    signals::{OpportunityEvent, PublishSink},
    state::SymbolStore,
    strategy::{self, FeeSchedule},
    venue::Venue,
};

pub use builder::Builder;
mod builder;

/// Tracks when the last scan ran and refuses scans that come too soon after it.
#[derive(Debug, Clone)]
pub struct ScanGate {
    min_interval: Duration,
    last_scan: Option<Instant>,
}

impl ScanGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_scan: None,
        }
    }

    /// Returns whether a scan may run at `now`, recording `now` as the last scan if so.
    pub fn try_begin(&mut self, now: Instant) -> bool {
        let open = match self.last_scan {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if open {
            self.last_scan = Some(now);
        }
        open
    }

    pub fn last_scan(&self) -> Option<Instant> {
        self.last_scan
    }
}

/// Fixed inputs of every evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ScanParams {
    pub venue_a: Venue,
    pub venue_b: Venue,
    pub position_size_usd: f64,
    pub fees: FeeSchedule,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub matched: usize,
    pub published: usize,
    pub failed: usize,
}

/// Evaluates every matched instrument once and publishes each scenario produced.
///
/// Scenarios are forwarded regardless of their sign or finiteness. A failed publish is
/// logged and the scan moves on to the next instrument.
pub fn scan(store: &SymbolStore, params: &ScanParams, sink: &dyn PublishSink) -> ScanReport {
    let matched = store.matched_symbols(params.venue_a, params.venue_b);
    let mut report = ScanReport {
        matched: matched.len(),
        ..Default::default()
    };

    for symbol in matched {
        let Some(scenario) = strategy::evaluate(
            params.position_size_usd,
            symbol.snapshot_a.funding_rate,
            symbol.snapshot_b.funding_rate,
            &params.fees,
        ) else {
            debug!(instrument = %symbol.instrument, "no scenario for instrument");
            continue;
        };

        if !scenario.best_apy().is_finite() {
            debug!(instrument = %symbol.instrument, %scenario, "scenario has non-finite yield");
        }

        let event = OpportunityEvent {
            instrument: symbol.instrument,
            timestamp: Utc::now(),
            venue_a: params.venue_a,
            snapshot_a: symbol.snapshot_a,
            venue_b: params.venue_b,
            snapshot_b: symbol.snapshot_b,
            scenario,
        };
        trace!(%event, "publishing opportunity");

        let instrument = event.instrument.clone();
        match sink.publish(event) {
            Ok(()) => report.published += 1,
            Err(e) => {
                warn!(%instrument, error = %e, "failed to publish opportunity");
                report.failed += 1;
            }
        }
    }

    report
}

pub struct Handle {
    shutdown_token: CancellationToken,
    worker_handle: Option<JoinHandle<eyre::Result<()>>>,
}

impl Handle {
    /// Cancels the worker and waits for it. A worker that already exited is not awaited
    /// again.
    pub async fn shutdown(&mut self) -> eyre::Result<()> {
        self.shutdown_token.cancel();
        let Some(task) = self.worker_handle.take() else {
            return Ok(());
        };
        match task.await {
            Ok(res) => res,
            Err(e) => {
                error!("scheduler worker panicked: {}", e);
                Err(e.into())
            }
        }
    }
}

// Awaiting the handle deals with the Worker's result
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
            .expect("scheduler handle must not be polled after shutdown");

        let result = std::task::ready!(task.poll_unpin(cx));
        self.worker_handle = None;
        std::task::Poll::Ready(match result {
            Ok(worker_res) => match worker_res {
                Ok(()) => Ok(()),
                Err(e) => Err(e).wrap_err("scheduler task returned with err"),
            },
            Err(e) => Err(e).wrap_err("scheduler task panicked"),
        })
    }
}

struct Worker {
    store: SymbolStore,
    sink: Arc<dyn PublishSink>,
    params: ScanParams,
    gate: ScanGate,
    tick_interval: Duration,
    update_notify: Arc<Notify>,
    shutdown_token: CancellationToken,
}

impl Worker {
    #[instrument(name = "opportunity_scheduler", skip(self), fields(
        venue_a = %self.params.venue_a,
        venue_b = %self.params.venue_b,
    ))]
    async fn run(mut self) -> eyre::Result<()> {
        info!(
            min_interval = %humantime::format_duration(self.tick_interval),
            "starting opportunity scheduler"
        );

        let mut timer = tokio::time::interval(self.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("scheduler received shutdown signal");
                    break Ok(());
                }

                () = self.update_notify.notified() => self.trigger("update"),

                _ = timer.tick() => self.trigger("timer"),
            }
        }
    }

    fn trigger(&mut self, source: &'static str) {
        if !self.gate.try_begin(Instant::now()) {
            trace!(source, "skipping scan, too soon since last one");
            return;
        }

        let report = scan(&self.store, &self.params, self.sink.as_ref());
        info!(
            source,
            matched = report.matched,
            published = report.published,
            failed = report.failed,
            "completed opportunity scan"
        );
    }
}
