use chrono::Utc;
use color_eyre::eyre::{self, WrapErr as _, eyre};
use serde::{Deserialize, Serialize};

use super::{FeedProtocol, wire};
use crate::{instrument::InstrumentId, state::VenueSnapshot, venue::Venue};

/// Hyperliquid `activeAssetCtx` feed. Coins are already canonical instrument ids.
#[derive(Debug, Clone)]
pub struct Hyperliquid {
    coins: Vec<InstrumentId>,
}

impl Hyperliquid {
    pub fn new(coins: Vec<InstrumentId>) -> Self {
        Self { coins }
    }
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    method: &'static str,
    subscription: Subscription<'a>,
}

#[derive(Serialize)]
struct Subscription<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    coin: &'a str,
}

#[derive(Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct ActiveAssetCtx {
    coin: String,
    ctx: AssetCtx,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetCtx {
    #[serde(deserialize_with = "wire::decimal")]
    funding: f64,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    mark_px: Option<f64>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    oracle_px: Option<f64>,
    #[serde(default, deserialize_with = "wire::optional_decimal")]
    open_interest: Option<f64>,
}

impl FeedProtocol for Hyperliquid {
    fn venue(&self) -> Venue {
        Venue::Hyperliquid
    }

    fn subscriptions(&self) -> eyre::Result<Vec<String>> {
        self.coins
            .iter()
            .map(|coin| {
                serde_json::to_string(&SubscribeRequest {
                    method: "subscribe",
                    subscription: Subscription {
                        kind: "activeAssetCtx",
                        coin: coin.as_str(),
                    },
                })
                .wrap_err("failed to serialize subscription")
            })
            .collect()
    }

    fn heartbeat(&self) -> Option<String> {
        Some(r#"{"method":"ping"}"#.to_string())
    }

    fn parse(&self, text: &str) -> eyre::Result<Vec<(InstrumentId, VenueSnapshot)>> {
        let Envelope { channel, data } =
            serde_json::from_str(text).wrap_err("message is not a channel envelope")?;

        match channel.as_str() {
            "activeAssetCtx" => {
                let ActiveAssetCtx { coin, ctx } =
                    serde_json::from_value(data).wrap_err("malformed activeAssetCtx payload")?;
                let snapshot = VenueSnapshot {
                    funding_rate: ctx.funding,
                    mark_price: ctx.mark_px,
                    index_price: ctx.oracle_px,
                    open_interest: ctx.open_interest,
                    current_funding_rate: None,
                    funding_timestamp: None,
                    observed_at: Utc::now(),
                };
                Ok(vec![(InstrumentId::from(coin), snapshot)])
            }
            "error" => Err(eyre!("venue reported error: {data}")),
            _ => Ok(vec![]),
        }
    }
}
