pub mod config;
pub mod error;
pub mod eventsource;
pub mod transport;
pub mod types;
pub use error::{ConnectorError, Result};
pub use eventsource::Client;
