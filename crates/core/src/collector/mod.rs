//! Venue feed collectors.
//!
//! A collector owns one streaming connection to a venue. It subscribes, parses every
//! inbound message into [`VenueSnapshot`]s, writes them into the shared [`SymbolStore`]
//! and wakes the scheduler. When the connection ends for any reason it waits a fixed
//! delay and reconnects, until shut down.

use std::{pin::Pin, sync::Arc, time::Duration};

use color_eyre::eyre::{self, WrapErr as _};
use futures::{SinkExt as _, StreamExt as _};
use tokio::{
    select,
    sync::{Notify, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    instrument::InstrumentId,
    state::{SymbolStore, VenueSnapshot},
    venue::Venue,
};

pub use builder::Builder;
pub use hyperliquid::Hyperliquid;
pub use lighter::Lighter;
pub use transport::{Connect, WsConnector, WsError};

mod builder;
mod hyperliquid;
mod lighter;
mod transport;
mod wire;

/// Lifecycle of a collector's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    SubscriptionSent,
    Streaming,
}

/// Venue-specific message protocol spoken over the feed connection.
pub trait FeedProtocol: Send + Sync + 'static {
    fn venue(&self) -> Venue;

    /// Messages sent once after every successful connect.
    fn subscriptions(&self) -> eyre::Result<Vec<String>>;

    /// Application-level keepalive, if the venue drops idle connections.
    fn heartbeat(&self) -> Option<String> {
        None
    }

    /// Parses one inbound text message.
    ///
    /// Control messages (acks, pongs) parse to no updates. Malformed payloads are errors.
    fn parse(&self, text: &str) -> eyre::Result<Vec<(InstrumentId, VenueSnapshot)>>;
}

pub struct Handle {
    venue: Venue,
    shutdown_token: CancellationToken,
    worker_handle: Option<JoinHandle<eyre::Result<()>>>,
    state_rx: watch::Receiver<ConnectionState>,
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
                error!(venue = %self.venue, "feed collector worker panicked: {}", e);
                Err(e.into())
            }
        }
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_rx(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
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
            .expect("collector handle must not be polled after shutdown");

        let result = std::task::ready!(task.poll_unpin(cx));
        self.worker_handle = None;
        std::task::Poll::Ready(match result {
            Ok(worker_res) => match worker_res {
                Ok(()) => Ok(()),
                Err(e) => Err(e).wrap_err("collector task returned with err"),
            },
            Err(e) => Err(e).wrap_err("collector task panicked"),
        })
    }
}

enum SessionEnd {
    Shutdown,
    Closed,
}

struct Worker<P, C> {
    protocol: P,
    connector: C,
    url: String,
    store: SymbolStore,
    update_notify: Arc<Notify>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    shutdown_token: CancellationToken,
}

impl<P: FeedProtocol, C: Connect> Worker<P, C> {
    #[instrument(name = "feed_collector", skip(self), fields(venue = %self.protocol.venue()))]
    async fn run(self) -> eyre::Result<()> {
        info!(url = %self.url, "starting feed collector");

        loop {
            match self.session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Closed) => info!("feed connection closed"),
                Err(e) => warn!(error = %e, "feed connection failed"),
            }
            self.set_state(ConnectionState::Disconnected);

            debug!(
                delay = %humantime::format_duration(self.reconnect_delay),
                "waiting before reconnecting"
            );
            select! {
                biased;

                () = self.shutdown_token.cancelled() => break,

                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("feed collector received shutdown signal");
        Ok(())
    }

    async fn session(&self) -> eyre::Result<SessionEnd> {
        self.set_state(ConnectionState::Connecting);

        let (mut sink, mut stream) = select! {
            biased;

            () = self.shutdown_token.cancelled() => return Ok(SessionEnd::Shutdown),

            res = self.connector.connect(&self.url) => res?,
        };
        info!("connected to feed");

        for request in self.protocol.subscriptions()? {
            sink.send(Message::text(request))
                .await
                .wrap_err("failed to send subscription")?;
        }
        self.set_state(ConnectionState::SubscriptionSent);
        debug!("sent subscriptions");

        let ping = self.protocol.heartbeat();
        let mut heartbeat = ping.as_ref().and_then(|_| self.heartbeat_timer());
        if ping.is_some() && heartbeat.is_none() {
            warn!(
                interval = %humantime::format_duration(self.heartbeat_interval),
                "heartbeat interval out of range, not sending heartbeats"
            );
        }

        loop {
            select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        debug!(error = %e, "failed to send close frame");
                    }
                    return Ok(SessionEnd::Shutdown);
                }

                () = next_heartbeat(&mut heartbeat) => {
                    if let Some(ping) = &ping {
                        sink.send(Message::text(ping.clone()))
                            .await
                            .wrap_err("failed to send heartbeat")?;
                        trace!("sent heartbeat");
                    }
                }

                msg = stream.next() => match msg {
                    None => return Ok(SessionEnd::Closed),
                    Some(Err(e)) => return Err(e).wrap_err("feed stream failed"),
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "received close frame");
                        return Ok(SessionEnd::Closed);
                    }
                    // protocol pings are answered by tungstenite
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    /// `None` when the first tick would lie beyond what the clock can represent.
    fn heartbeat_timer(&self) -> Option<Interval> {
        // tokio intervals reject a zero period
        let period = self.heartbeat_interval.max(Duration::from_millis(1));
        let start = Instant::now().checked_add(period)?;
        let mut timer = tokio::time::interval_at(start, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    }

    fn handle_text(&self, text: &str) {
        let updates = match self.protocol.parse(text) {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, raw = text, "dropping unparseable message");
                return;
            }
        };
        if updates.is_empty() {
            trace!(raw = text, "control message");
            return;
        }

        let venue = self.protocol.venue();
        for (instrument, snapshot) in updates {
            debug!(%instrument, funding_rate = snapshot.funding_rate, "stored snapshot");
            self.store.set(venue, instrument, snapshot);
        }
        self.set_state(ConnectionState::Streaming);
        self.update_notify.notify_one();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                trace!(from = ?*current, to = ?state, "connection state changed");
                *current = state;
                true
            }
        });
    }
}

/// Resolves on the next heartbeat tick, or never when the session has no heartbeat.
async fn next_heartbeat(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
