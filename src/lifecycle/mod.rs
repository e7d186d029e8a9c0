//! Process lifecycle: bring-up, signals and coordinated stop.
//!
//! # Data Flow
//! ```text
//! startup.rs   config → counter store + audit sink (fatal on connect failure)
//! signals.rs   SIGINT / SIGTERM → Shutdown::trigger
//! shutdown.rs  broadcast → gateway listener, admin listener,
//!              policy updater, counter purge
//! gateway      listener drained → audit worker flushes its queue and exits
//! ```
//!
//! # Design Decisions
//! - Backends are connected before any listener binds
//! - The audit worker is stopped by the gateway only after in-flight
//!   connections have drained, so their events are still written

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
