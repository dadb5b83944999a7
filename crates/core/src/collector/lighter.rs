use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use color_eyre::eyre::{self, WrapErr as _};
use serde::{Deserialize, Serialize};

use super::{FeedProtocol, wire};
use crate::{
    instrument::{InstrumentId, SymbolMap},
    state::VenueSnapshot,
    venue::Venue,
};

/// Lighter `market_stats/all` feed. Market ids are mapped through the [`SymbolMap`];
/// unmapped ids land in the `Unknown` bucket.
#[derive(Debug, Clone)]
pub struct Lighter {
    symbols: Arc<SymbolMap>,
}

impl Lighter {
    pub fn new(symbols: Arc<SymbolMap>) -> Self {
        Self { symbols }
    }
}

#[derive(Serialize)]
struct SubscribeRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    channel: &'static str,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    market_stats: serde_json::Value,
}

#[derive(Deserialize)]
struct MarketStats {
    #[serde(deserialize_with = "wire::decimal")]
    funding_rate: f64,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    mark_price: Option<f64>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    index_price: Option<f64>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    current_funding_rate: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    funding_timestamp: Option<DateTime<Utc>>,
}

impl FeedProtocol for Lighter {
    fn venue(&self) -> Venue {
        Venue::Lighter
    }

    fn subscriptions(&self) -> eyre::Result<Vec<String>> {
        let request = serde_json::to_string(&SubscribeRequest {
            kind: "subscribe",
            channel: "market_stats/all",
        })
        .wrap_err("failed to serialize subscription")?;
        Ok(vec![request])
    }

    fn parse(&self, text: &str) -> eyre::Result<Vec<(InstrumentId, VenueSnapshot)>> {
        let Envelope { kind, market_stats } =
            serde_json::from_str(text).wrap_err("message is not a typed envelope")?;

        // the subscription ack carries the initial snapshot of every market
        if kind != "update/market_stats" && kind != "subscribed/market_stats" {
            return Ok(vec![]);
        }

        let stats: HashMap<String, MarketStats> =
            serde_json::from_value(market_stats).wrap_err("malformed market_stats payload")?;
        let observed_at = Utc::now();

        Ok(stats
            .into_iter()
            .map(|(market_id, stats)| {
                let snapshot = VenueSnapshot {
                    funding_rate: stats.funding_rate,
                    mark_price: stats.mark_price,
                    index_price: stats.index_price,
                    open_interest: stats.open_interest,
                    current_funding_rate: stats.current_funding_rate,
                    funding_timestamp: stats.funding_timestamp,
                    observed_at,
                };
                (self.symbols.lookup(&market_id), snapshot)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> Lighter {
        let symbols = SymbolMap::from_json_str(r#"{"0": "ETH", "1": "BTC"}"#).unwrap();
        Lighter::new(Arc::new(symbols))
    }

    #[test]
    fn subscribes_to_all_markets_at_once() {
        assert_eq!(
            protocol().subscriptions().unwrap(),
            vec![r#"{"type":"subscribe","channel":"market_stats/all"}"#]
        );
    }

    #[test]
    fn parses_market_stats_update() {
        let raw = r#"{
            "type": "update/market_stats",
            "channel": "market_stats:all",
            "market_stats": {
                "1": {
                    "market_id": 1,
                    "index_price": "64001.2",
                    "mark_price": "64005.0",
                    "open_interest": "812.5",
                    "current_funding_rate": "0.0012",
                    "funding_rate": "0.0106",
                    "funding_timestamp": 1730000000000
                },
                "9": {
                    "market_id": 9,
                    "funding_rate": 0.002
                }
            }
        }"#;

        let mut updates = protocol().parse(raw).unwrap();
        updates.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(updates.len(), 2);
        let (btc, snapshot) = &updates[0];
        assert_eq!(btc, &InstrumentId::from("BTC"));
        assert_eq!(snapshot.funding_rate, 0.0106);
        assert_eq!(snapshot.mark_price, Some(64005.0));
        assert_eq!(snapshot.index_price, Some(64001.2));
        assert_eq!(snapshot.open_interest, Some(812.5));
        assert_eq!(snapshot.current_funding_rate, Some(0.0012));
        assert_eq!(
            snapshot.funding_timestamp,
            DateTime::from_timestamp_millis(1_730_000_000_000)
        );

        let (unknown, snapshot) = &updates[1];
        assert!(unknown.is_unknown());
        assert_eq!(snapshot.funding_rate, 0.002);
        assert_eq!(snapshot.mark_price, None);
        assert_eq!(snapshot.current_funding_rate, None);
        assert_eq!(snapshot.funding_timestamp, None);
    }

    #[test]
    fn subscription_ack_seeds_snapshots() {
        let raw = r#"{"type":"subscribed/market_stats","market_stats":{"0":{"funding_rate":"-0.0004"}}}"#;
        let updates = protocol().parse(raw).unwrap();
        assert_eq!(updates[0].0, InstrumentId::from("ETH"));
        assert_eq!(updates[0].1.funding_rate, -0.0004);
    }

    #[test]
    fn other_message_types_carry_no_updates() {
        assert!(protocol().parse(r#"{"type":"connected"}"#).unwrap().is_empty());
        assert!(protocol().parse(r#"{"type":"ping"}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_messages_are_errors() {
        let p = protocol();
        assert!(p.parse("{").is_err());
        assert!(p.parse(r#"{"channel":"market_stats:all"}"#).is_err());
        assert!(p.parse(r#"{"type":"update/market_stats"}"#).is_err());
        assert!(
            p.parse(r#"{"type":"update/market_stats","market_stats":{"1":{"mark_price":"1"}}}"#)
                .is_err()
        );
    }
}
