//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the broadcast service and the port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (the polled rate provider).
pub mod ports;

/// Application services (broadcast loop, fetch retry policy).
pub mod services;
