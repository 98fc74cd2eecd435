pub mod error;
pub mod flights;
pub mod metrics;
