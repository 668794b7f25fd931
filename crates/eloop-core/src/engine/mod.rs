//! # Engine Module
//!
//! The stateful machinery of a sweep: configuration, the per-rank state machine, the
//! solver collaborator interface, the message-passing transport, and the gather/merge
//! protocol that reassembles per-rank results at the coordinator.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Sweep parameters and their validating builder
//! - **Coordination** ([`coordinator`]) - One rank's walk through the sweep lifecycle
//! - **State Tracking** ([`state`]) - The `Idle → … → Done` state machine
//! - **Solver Interface** ([`solver`]) - The external per-point solver and its scoped handle
//! - **Transport** ([`transport`]) - Barrier and buffer delivery between ranks
//! - **Gather/Merge** ([`gather`]) - Buffer collection, validation, and ordered merge
//! - **Progress Monitoring** ([`progress`]) - Coordinator-side progress events
//! - **Error Handling** ([`error`]) - Engine-specific error types and error propagation

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gather;
pub mod progress;
pub mod solver;
pub mod state;
pub mod transport;
