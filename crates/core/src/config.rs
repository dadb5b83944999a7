use std::{path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::strategy::FeeSchedule;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hyperliquid websocket endpoint
    pub hyperliquid_url: String,

    /// Lighter websocket endpoint
    pub lighter_url: String,

    /// JSON file mapping Lighter market ids to canonical instruments
    pub symbols_path: PathBuf,

    /// Notional of the hedged position in USD
    pub position_size_usd: f64,

    /// Maker fee in percent
    pub maker_fee_pct: f64,

    /// Taker fee in percent
    pub taker_fee_pct: f64,

    /// Minimum time between two opportunity scans
    pub min_scan_interval_ms: u64,

    /// Fixed delay before a collector reconnects
    pub reconnect_delay_ms: u64,

    /// Application-level ping period for venues that need one
    pub heartbeat_interval_ms: u64,

    /// Buffered events per downstream subscriber
    pub publish_capacity: usize,

    /// Log filter used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hyperliquid_url: "wss://api.hyperliquid.xyz/ws".to_string(),
            lighter_url: "wss://mainnet.zklighter.elliot.ai/stream".to_string(),
            symbols_path: PathBuf::from("market_symbols.json"),
            position_size_usd: 300_000.0,
            maker_fee_pct: 0.01,
            taker_fee_pct: 0.035,
            min_scan_interval_ms: 60_000,
            reconnect_delay_ms: 5_000,
            heartbeat_interval_ms: 50_000,
            publish_capacity: 256,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional `fundingd.yaml`, and `FUNDINGD_`
    /// environment variables, in increasing precedence.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file("fundingd.yaml"))
            .merge(Env::prefixed("FUNDINGD_"))
    }

    pub fn fees(&self) -> FeeSchedule {
        FeeSchedule {
            maker_fee_pct: self.maker_fee_pct,
            taker_fee_pct: self.taker_fee_pct,
        }
    }

    pub fn min_scan_interval(&self) -> Duration {
        Duration::from_millis(self.min_scan_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
