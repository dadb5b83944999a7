//! `fundingd` watches Hyperliquid and Lighter funding rates and reports cross-venue
//! hedges.
//!
//! [`Fundingd::spawn`] starts one feed collector per venue, the rate-gated opportunity
//! scheduler and a publisher that logs every opportunity as JSON. The returned handle
//! resolves if any of them stops on its own, which only happens on failure.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use color_eyre::eyre::{self, Context as _};
use funding_core::config::Config;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

mod publisher;
mod service;
pub mod telemetry;

/// Running funding-rate monitor returned by [`Fundingd::spawn`].
///
/// Await it to learn when the monitor fails; call [`Fundingd::shutdown`] to stop it.
pub struct Fundingd {
    shutdown_token: CancellationToken,
    task: Option<JoinHandle<eyre::Result<()>>>,
}

impl Fundingd {
    /// Loads the Lighter symbol map named by `cfg.symbols_path` and spawns the monitor.
    ///
    /// Collectors connect in the background, so an unreachable venue is not an error
    /// here; it shows up as reconnect warnings.
    ///
    /// # Errors
    /// Returns an error if the symbol map exists but cannot be read or parsed.
    pub fn spawn(cfg: Config) -> eyre::Result<Self> {
        let shutdown_token = CancellationToken::new();
        let inner = service::Service::new(cfg, shutdown_token.child_token())?;
        let task = tokio::spawn(inner.run());

        Ok(Self {
            shutdown_token,
            task: Some(task),
        })
    }

    /// Closes both venue connections, stops scanning, logs any opportunities still
    /// buffered and waits for every component to stop.
    ///
    /// # Errors
    /// Returns an error if a component had already failed.
    ///
    /// # Panics
    /// Panics if the service was already awaited to completion.
    pub async fn shutdown(mut self) -> eyre::Result<()> {
        self.shutdown_token.cancel();
        flatten_join_result(
            self.task
                .take()
                .expect("shutdown must only be called once")
                .await,
        )
    }
}

impl Future for Fundingd {
    type Output = eyre::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        use futures::future::FutureExt as _;

        let task = self
            .task
            .as_mut()
            .expect("fundingd must not be polled after completion");
        task.poll_unpin(cx).map(flatten_join_result)
    }
}

pub(crate) fn flatten_join_result<T>(res: Result<eyre::Result<T>, JoinError>) -> eyre::Result<T> {
    match res {
        Ok(Ok(res)) => Ok(res),
        Ok(Err(e)) => Err(e).wrap_err("task returned with error"),
        Err(e) => Err(e).wrap_err("task panicked"),
    }
}
