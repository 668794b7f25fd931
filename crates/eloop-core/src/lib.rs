//! # eloop Core Library
//!
//! A parallel sweep engine: it distributes an ordered numeric domain (typically an energy
//! grid) across a fixed pool of cooperating ranks, drives a pluggable per-point solver to
//! produce one or more named result series, and reassembles the per-rank partial results
//! into globally ordered series that are checkpointed to append-only storage.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless building blocks: the ordered `PointDomain`,
//!   the contiguous `Partitioner`, the tagged `ResultSeries` container and the checkpoint
//!   encodings with their append-only writer and scanning reader.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery of one sweep: configuration,
//!   the `Solver` collaborator boundary with scoped per-point handles, the rank lifecycle
//!   state machine, the message-passing `Communicator`, the gather/merge protocol and the
//!   per-rank `SweepCoordinator`.
//!
//! - **[`workflows`]: The Public API.** Runs a complete sweep with `P` in-process ranks and
//!   reports the merged, verified and persisted result series.

pub mod core;
pub mod engine;
pub mod workflows;
