//! # Core Module
//!
//! Stateless building blocks of a parallel sweep.
//!
//! - **Domain** ([`domain`]) - The ordered set of sweep points and their coordinates
//! - **Partitioning** ([`partition`]) - Contiguous, balanced assignment of points to ranks
//! - **Series** ([`series`]) - Tagged result channels, their records and merge verification
//! - **Checkpoint I/O** ([`io`]) - Append-only block storage in text or binary encoding
//!
//! Nothing in this layer knows about threads, channels or solvers; the [`crate::engine`]
//! layer composes these pieces into a running sweep.

pub mod domain;
pub mod io;
pub mod partition;
pub mod series;
