use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use super::VenueSnapshot;
use crate::{instrument::InstrumentId, venue::Venue};

type Slots = HashMap<Venue, Arc<VenueSnapshot>>;

/// Keyed store of the latest [`VenueSnapshot`] per venue per instrument.
///
/// Cloning the store clones the handle, not the data. Each venue's collector is the only
/// writer for that venue's slots. A write replaces the previous snapshot outright.
#[derive(Debug, Clone, Default)]
pub struct SymbolStore {
    inner: Arc<RwLock<HashMap<InstrumentId, Slots>>>,
}

/// An instrument with both requested venue slots populated, read at one instant.
#[derive(Debug, Clone)]
pub struct MatchedSymbol {
    pub instrument: InstrumentId,
    pub snapshot_a: Arc<VenueSnapshot>,
    pub snapshot_b: Arc<VenueSnapshot>,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, venue: Venue, instrument: InstrumentId, snapshot: VenueSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.inner
            .write()
            .entry(instrument)
            .or_default()
            .insert(venue, snapshot);
    }

    pub fn get(&self, venue: Venue, instrument: &InstrumentId) -> Option<Arc<VenueSnapshot>> {
        self.inner
            .read()
            .get(instrument)
            .and_then(|slots| slots.get(&venue))
            .cloned()
    }

    /// All instruments observed on both `venue_a` and `venue_b`, sorted by instrument.
    ///
    /// The read lock is held only while the snapshot pointers are copied out, so each
    /// returned pair is exactly what was last set when the read happened.
    pub fn matched_symbols(&self, venue_a: Venue, venue_b: Venue) -> Vec<MatchedSymbol> {
        let mut matched: Vec<MatchedSymbol> = {
            let guard = self.inner.read();
            guard
                .iter()
                .filter_map(|(instrument, slots)| {
                    match (slots.get(&venue_a), slots.get(&venue_b)) {
                        (Some(a), Some(b)) => Some(MatchedSymbol {
                            instrument: instrument.clone(),
                            snapshot_a: Arc::clone(a),
                            snapshot_b: Arc::clone(b),
                        }),
                        _ => None,
                    }
                })
                .collect()
        };
        matched.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        matched
    }

    /// Number of instruments with at least one populated slot.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rate: f64) -> VenueSnapshot {
        VenueSnapshot::with_funding_rate(rate)
    }

    #[test]
    fn set_overwrites_previous_snapshot() {
        let store = SymbolStore::new();
        let btc = InstrumentId::from("BTC");

        store.set(Venue::Hyperliquid, btc.clone(), snapshot(0.1));
        store.set(Venue::Hyperliquid, btc.clone(), snapshot(0.2));

        let latest = store.get(Venue::Hyperliquid, &btc).unwrap();
        assert_eq!(latest.funding_rate, 0.2);
        assert!(store.get(Venue::Lighter, &btc).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn matched_requires_both_slots() {
        let store = SymbolStore::new();
        store.set(Venue::Hyperliquid, "BTC".into(), snapshot(0.1));
        store.set(Venue::Hyperliquid, "ETH".into(), snapshot(0.3));
        store.set(Venue::Lighter, "ETH".into(), snapshot(0.4));
        store.set(Venue::Lighter, "SOL".into(), snapshot(0.5));

        let matched = store.matched_symbols(Venue::Hyperliquid, Venue::Lighter);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].instrument, InstrumentId::from("ETH"));
        assert_eq!(matched[0].snapshot_a.funding_rate, 0.3);
        assert_eq!(matched[0].snapshot_b.funding_rate, 0.4);
    }

    #[test]
    fn matched_respects_venue_order() {
        let store = SymbolStore::new();
        store.set(Venue::Hyperliquid, "BTC".into(), snapshot(0.1));
        store.set(Venue::Lighter, "BTC".into(), snapshot(0.2));

        let matched = store.matched_symbols(Venue::Lighter, Venue::Hyperliquid);
        assert_eq!(matched[0].snapshot_a.funding_rate, 0.2);
        assert_eq!(matched[0].snapshot_b.funding_rate, 0.1);
    }

    #[test]
    fn concurrent_writers_do_not_interfere() {
        let store = SymbolStore::new();
        let writers: Vec<_> = [Venue::Hyperliquid, Venue::Lighter]
            .into_iter()
            .map(|venue| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let instrument = InstrumentId::from(format!("SYM{}", i % 50));
                        store.set(venue, instrument, snapshot(i as f64));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let matched = store.matched_symbols(Venue::Hyperliquid, Venue::Lighter);
        assert_eq!(matched.len(), 50);
        // last write wins: i in 450..500 covers every key once more
        assert!(matched.iter().all(|m| m.snapshot_a.funding_rate >= 450.0));
    }
}
