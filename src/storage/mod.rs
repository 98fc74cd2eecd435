mod error;
mod sqlite;
mod types;

pub use error::StorageError;
pub use sqlite::Storage;
pub use types::{AnalyticsUpdate, CurrentState, HistoryRecord, StateFilter};
