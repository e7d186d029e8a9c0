//! Edge request-filtering gateway library.

pub mod admin;
pub mod audit;
pub mod config;
pub mod decision;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod policy;
pub mod routing;
pub mod security;
pub mod store;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
