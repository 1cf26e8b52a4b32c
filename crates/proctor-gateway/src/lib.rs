//! proctor-gateway: gateway implementations and configuration.
//!
//! Implements the `Gateway` trait over HTTP and in memory, and loads the
//! configuration that selects between them.

pub mod config;
pub mod http;
pub mod mock;

pub use config::{create_gateway, load_config, load_config_from, GatewayConfig, ProctorConfig};
pub use http::HttpGateway;
pub use mock::MockGateway;
