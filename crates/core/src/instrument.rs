//! Canonical instrument identifiers and the venue-local market id lookup.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Display,
    path::Path,
};

use color_eyre::eyre::{self, WrapErr as _};
use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";

/// Canonical identifier of a tradable instrument, shared across venues (e.g. `BTC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// The bucket that unmapped venue-local ids fall into.
    pub fn unknown() -> Self {
        Self(UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InstrumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for InstrumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Read-only mapping from a venue's market id to the canonical [`InstrumentId`].
///
/// The on-disk format is a flat JSON object, `{"0": "ETH", "1": "BTC"}`, as written by
/// the catalog bootstrap.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    by_market_id: HashMap<String, InstrumentId>,
}

impl SymbolMap {
    pub fn from_json_str(raw: &str) -> eyre::Result<Self> {
        let by_market_id: HashMap<String, InstrumentId> =
            serde_json::from_str(raw).wrap_err("symbol map must be a JSON object of strings")?;
        Ok(Self { by_market_id })
    }

    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read symbol map at {}", path.display()))?;
        Self::from_json_str(&raw)
            .wrap_err_with(|| format!("failed to parse symbol map at {}", path.display()))
    }

    /// Maps a market id to its instrument, falling back to [`InstrumentId::unknown`].
    pub fn lookup(&self, market_id: &str) -> InstrumentId {
        self.by_market_id
            .get(market_id)
            .cloned()
            .unwrap_or_else(InstrumentId::unknown)
    }

    /// All canonical instruments in the map, sorted and de-duplicated.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.by_market_id
            .values()
            .filter(|id| !id.is_unknown())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_market_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_market_id.is_empty()
    }
}

impl FromIterator<(String, InstrumentId)> for SymbolMap {
    fn from_iter<T: IntoIterator<Item = (String, InstrumentId)>>(iter: T) -> Self {
        Self {
            by_market_id: iter.into_iter().collect(),
        }
    }
}
