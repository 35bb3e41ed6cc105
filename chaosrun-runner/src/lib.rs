//! chaosrun runner library.
//!
//! Exposes the runner's building blocks for integration testing.
//! In production, `chaosrun` is used as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod runner;
pub mod signal;
pub mod sink;
