mod flight_cache;
mod types;

pub use flight_cache::FlightCache;
pub use types::{CacheStats, CachedFlight};
