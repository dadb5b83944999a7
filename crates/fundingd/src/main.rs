use std::process::ExitCode;

use color_eyre::eyre::{self, eyre};
use funding_core::config::Config;
use fundingd::{
    Fundingd,
    telemetry::{self, init_subscriber},
};
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
};
use tracing::{error, info, instrument, warn};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
        return ExitCode::FAILURE;
    }

    let cfg: Config = match Config::load() {
        Err(err) => {
            eprintln!("failed to read config:\n{err:?}");
            return ExitCode::FAILURE;
        }
        Ok(cfg) => cfg,
    };

    init_subscriber(telemetry::get_subscriber(&cfg.log_level));
    info!(?cfg, "starting fundingd");

    let mut fundingd = match Fundingd::spawn(cfg) {
        Ok(fundingd) => fundingd,
        Err(e) => {
            error!("failed initializing fundingd: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting sigterm listener on unix should always work");

    let exit_reason = select! {
        _ = sigterm.recv() => Ok("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => Ok("received SIGINT"),
        res = &mut fundingd => {
            res.and_then(|()| Err(eyre!("fundingd service exited")))
        },
    };

    shutdown(exit_reason, fundingd).await
}

#[instrument(skip_all)]
async fn shutdown(reason: eyre::Result<&str>, service: Fundingd) -> ExitCode {
    let exit_code = match reason {
        Ok(reason) => {
            info!(reason, "shutting down");
            if let Err(e) = service.shutdown().await {
                warn!(%e, "shutting down");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fundingd service exited unexpectedly: {e:?}");
            ExitCode::FAILURE
        }
    };
    info!("shutdown complete");
    exit_code
}
