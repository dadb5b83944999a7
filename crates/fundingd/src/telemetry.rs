use std::sync::OnceLock;

use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _};

static TELEMETRY_INIT: OnceLock<()> = OnceLock::new();

/// Builds the daemon's subscriber. `RUST_LOG` wins over `default_level` when set.
pub fn get_subscriber(default_level: &str) -> impl Subscriber + Send + Sync {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level))
        .add_directive("tungstenite=warn".parse().expect("well-formed"))
        .add_directive("tokio_tungstenite=warn".parse().expect("well-formed"))
        .add_directive("rustls=warn".parse().expect("well-formed"));

    let fmt_layer = fmt::layer()
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::Registry::default()
        .with(filter)
        .with(fmt_layer)
}

pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) {
    TELEMETRY_INIT
        .set(())
        .expect("global tracing subscriber already set");
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
