//! Bridge between a Jenkins CI server and the MQM quality management server.
//!
//! [`client::MqmClient`] talks to the MQM CI integration REST API: test result
//! uploads, pipeline registration, entity lookups and build event delivery.
//! [`jenkins`] adapts Jenkins jobs to the build lifecycle requests MQM issues.

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
pub mod jenkins;
pub mod types;

pub use client::{ConnectionConfig, MqmClient};
pub use error::{MqmError, Result};
