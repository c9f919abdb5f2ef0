//! REST client for the MQM CI integration API.

mod connection;
mod core;
mod entities;
mod events;
mod pipelines;
mod test_results;

pub use connection::{ConnectionConfig, DEFAULT_CLIENT_TYPE};
pub use self::core::MqmClient;
pub use entities::EntityFactory;
pub use test_results::{TestResultSource, DATETIME_FORMAT};
