//! Latest-observation state shared between the feed collectors and the scheduler.

mod snapshot;
mod store;

pub use snapshot::VenueSnapshot;
pub use store::{MatchedSymbol, SymbolStore};
