//! Real-time location broadcasting hub.
//!
//! The library crate holds the concurrency core (hub, session pumps,
//! writer pool, store contract) plus its ambient collaborators
//! (configuration, metrics, HTTP surface). `main.rs` and the load-test
//! binary are thin wiring on top of this.

pub mod config;
pub mod constants;
pub mod http;
pub mod hub;
pub mod location;
pub mod lossy;
pub mod metrics;
pub mod store;
pub mod transport;
pub mod writer;
