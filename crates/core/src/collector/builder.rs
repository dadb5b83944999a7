use std::{sync::Arc, time::Duration};

use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

use super::{Connect, ConnectionState, FeedProtocol, Handle, Worker};
use crate::state::SymbolStore;

pub struct Builder<P, C> {
    pub protocol: P,
    pub connector: C,
    pub url: String,
    pub store: SymbolStore,
    /// Woken after every message that wrote at least one snapshot
    pub update_notify: Arc<Notify>,
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
    pub shutdown_token: CancellationToken,
}

impl<P: FeedProtocol, C: Connect> Builder<P, C> {
    pub fn build(self) -> Handle {
        let Self {
            protocol,
            connector,
            url,
            store,
            update_notify,
            reconnect_delay,
            heartbeat_interval,
            shutdown_token,
        } = self;

        let venue = protocol.venue();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let worker = Worker {
            protocol,
            connector,
            url,
            store,
            update_notify,
            state_tx,
            reconnect_delay,
            heartbeat_interval,
            shutdown_token: shutdown_token.clone(),
        };
        let worker_handle = tokio::spawn(async move { worker.run().await });

        Handle {
            venue,
            shutdown_token,
            worker_handle: Some(worker_handle),
            state_rx,
        }
    }
}
