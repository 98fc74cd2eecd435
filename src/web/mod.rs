pub mod api;
pub mod api_doc;
pub mod server;
pub mod state;
pub mod ticker;

pub use server::run_server;
pub use state::AppState;
pub use ticker::TickerRotation;
