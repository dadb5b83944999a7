//! Lenient numeric decoding shared by the venue protocols.
//!
//! Venues send decimals as JSON strings (`"0.0000125"`) and sometimes as numbers.

use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDecimal {
    Number(f64),
    Text(String),
}

impl RawDecimal {
    fn into_f64(self) -> Result<f64, String> {
        let value = match self {
            RawDecimal::Number(value) => value,
            RawDecimal::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid decimal {text:?}: {e}"))?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("non-finite decimal {value}"))
        }
    }
}

pub(super) fn decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    RawDecimal::deserialize(deserializer)?
        .into_f64()
        .map_err(de::Error::custom)
}

pub(super) fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDecimal>::deserialize(deserializer)?
        .map(RawDecimal::into_f64)
        .transpose()
        .map_err(de::Error::custom)
}
