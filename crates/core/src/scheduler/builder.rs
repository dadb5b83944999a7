use std::{sync::Arc, time::Duration};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{Handle, ScanGate, ScanParams, Worker};
use crate::{signals::PublishSink, state::SymbolStore};

pub struct Builder {
    pub store: SymbolStore,
    pub sink: Arc<dyn PublishSink>,
    pub params: ScanParams,
    pub min_interval: Duration,
    pub update_notify: Arc<Notify>,
    pub shutdown_token: CancellationToken,
}

impl Builder {
    pub fn build(self) -> Handle {
        let Self {
            store,
            sink,
            params,
            min_interval,
            update_notify,
            shutdown_token,
        } = self;

        let worker = Worker {
            store,
            sink,
            params,
            gate: ScanGate::new(min_interval),
            // tokio intervals reject a zero period
            tick_interval: min_interval.max(Duration::from_millis(1)),
            update_notify,
            shutdown_token: shutdown_token.clone(),
        };
        let worker_handle = tokio::spawn(async move { worker.run().await });

        Handle {
            shutdown_token,
            worker_handle: Some(worker_handle),
        }
    }
}
