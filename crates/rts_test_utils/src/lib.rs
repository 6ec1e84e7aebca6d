//! # RTS Test Utilities
//!
//! Shared testing utilities for the spatial crates:
//! - Determinism test harness
//! - Index and formation fixtures
//! - Pathing stubs
//! - Property-based testing strategies
//! - Test log capture

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod logging;

/// Re-export proptest for convenience.
pub use proptest;
