//! # Workflows Module
//!
//! Top-level entry points that run a complete sweep from configuration to checkpoint.
//!
//! - **Sweep Workflow** ([`sweep`]) - Spawns one in-process rank per worker, joins them,
//!   and returns the coordinator's merged report or the root-cause error.

pub mod sweep;
