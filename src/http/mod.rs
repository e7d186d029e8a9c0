//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum + tower: request id, trace, concurrency limit, timeout)
//!     → request.rs (client address, signals, principal, buffered body)
//!     → decision engine
//!     → allow: server.rs forwards to the origin
//!       deny:  response.rs synthesizes the JSON denial
//!     → security headers applied to every response
//! ```
//!
//! # Design Decisions
//! - The body is buffered once and replayed to the origin unchanged
//! - One origin attempt per request; failures surface as 502
//! - Peer address is optional so the router works without a socket

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer, OriginTarget};
