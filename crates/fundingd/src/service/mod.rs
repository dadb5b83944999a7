use std::{path::Path, sync::Arc, time::Duration};

use color_eyre::eyre::{self, WrapErr as _, eyre};
use funding_core::{
    collector::{self, Hyperliquid, Lighter, WsConnector},
    config::Config,
    instrument::SymbolMap,
    scheduler::{self, ScanParams},
    signals::BroadcastSink,
    state::SymbolStore,
    venue::Venue,
};
use tokio::{select, sync::Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::publisher;

pub(super) struct Service {
    shutdown_token: CancellationToken,
    hyperliquid_handle: collector::Handle,
    lighter_handle: collector::Handle,
    scheduler_handle: scheduler::Handle,
    publisher_handle: publisher::Handle,
}

impl Service {
    pub(super) fn new(cfg: Config, shutdown_token: CancellationToken) -> eyre::Result<Self> {
        let symbols = Arc::new(load_symbols(&cfg.symbols_path)?);
        let coins = symbols.instruments();
        info!(
            markets = symbols.len(),
            instruments = coins.len(),
            path = %cfg.symbols_path.display(),
            "🗺️ loaded symbol map"
        );

        let store = SymbolStore::new();
        let update_notify = Arc::new(Notify::new());
        let sink = BroadcastSink::new(cfg.publish_capacity);

        // subscribe before anything can publish
        let publisher_handle = publisher::Builder {
            events: sink.subscribe(),
            shutdown_token: shutdown_token.child_token(),
        }
        .build();

        let hyperliquid_handle = collector::Builder {
            protocol: Hyperliquid::new(coins),
            connector: WsConnector,
            url: cfg.hyperliquid_url.clone(),
            store: store.clone(),
            update_notify: Arc::clone(&update_notify),
            reconnect_delay: cfg.reconnect_delay(),
            heartbeat_interval: cfg.heartbeat_interval(),
            shutdown_token: shutdown_token.child_token(),
        }
        .build();

        let lighter_handle = collector::Builder {
            protocol: Lighter::new(Arc::clone(&symbols)),
            connector: WsConnector,
            url: cfg.lighter_url.clone(),
            store: store.clone(),
            update_notify: Arc::clone(&update_notify),
            reconnect_delay: cfg.reconnect_delay(),
            heartbeat_interval: cfg.heartbeat_interval(),
            shutdown_token: shutdown_token.child_token(),
        }
        .build();

        let scheduler_handle = scheduler::Builder {
            store,
            sink: Arc::new(sink),
            params: ScanParams {
                venue_a: Venue::Hyperliquid,
                venue_b: Venue::Lighter,
                position_size_usd: cfg.position_size_usd,
                fees: cfg.fees(),
            },
            min_interval: cfg.min_scan_interval(),
            update_notify,
            shutdown_token: shutdown_token.child_token(),
        }
        .build();

        Ok(Self {
            shutdown_token,
            hyperliquid_handle,
            lighter_handle,
            scheduler_handle,
            publisher_handle,
        })
    }

    pub(super) async fn run(mut self) -> eyre::Result<()> {
        // every component runs until cancelled, so any exit before that is a failure
        let reason: eyre::Result<&'static str> = select! {
            biased;

            () = self.shutdown_token.cancelled() => Ok("received shutdown signal"),

            res = &mut self.hyperliquid_handle => {
                res.and_then(|()| Err(eyre!("hyperliquid collector exited")))
            }

            res = &mut self.lighter_handle => {
                res.and_then(|()| Err(eyre!("lighter collector exited")))
            }

            res = &mut self.scheduler_handle => {
                res.and_then(|()| Err(eyre!("opportunity scheduler exited")))
            }

            res = &mut self.publisher_handle => {
                res.and_then(|()| Err(eyre!("opportunity publisher exited")))
            }
        };

        self.shutdown(reason).await
    }

    #[instrument(skip_all)]
    async fn shutdown(mut self, reason: eyre::Result<&'static str>) -> eyre::Result<()> {
        const WAIT_BEFORE_ABORT: Duration = Duration::from_secs(25);

        self.shutdown_token.cancel();

        let message = format!(
            "waiting {} for all subtasks to shutdown before aborting",
            humantime::format_duration(WAIT_BEFORE_ABORT)
        );
        match &reason {
            Ok(reason) => info!(%reason, message),
            Err(reason) => error!(%reason, message),
        };

        let all_stopped = async {
            // the publisher logs whatever is still buffered when it sees the cancellation
            for (name, res) in [
                ("scheduler", self.scheduler_handle.shutdown().await),
                ("hyperliquid collector", self.hyperliquid_handle.shutdown().await),
                ("lighter collector", self.lighter_handle.shutdown().await),
                ("publisher", self.publisher_handle.shutdown().await),
            ] {
                if let Err(e) = res {
                    error!(component = name, "failed to shut down cleanly: {e:#}");
                }
            }
        };
        if tokio::time::timeout(WAIT_BEFORE_ABORT, all_stopped)
            .await
            .is_err()
        {
            warn!("subtasks did not shut down in time, abandoning them");
        }

        reason.map(|_| ())
    }
}

/// A missing file starts the monitor with no instruments; an unreadable or malformed
/// one is a startup error.
fn load_symbols(path: &Path) -> eyre::Result<SymbolMap> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "symbol map not found, no instruments will be correlated"
        );
        return Ok(SymbolMap::default());
    }
    SymbolMap::load(path).wrap_err("failed to load symbol map")
}
