mod client;
mod error;
mod parsing;
mod types;

pub use client::{OpenSkyClient, StateSource};
pub use error::SourceError;
pub use types::{GeoPoint, PositionSource, StateFrame};

#[cfg(test)]
pub use types::{SourceQuery, StateBatch};
