//! # RTS Spatial
//!
//! Deterministic spatial partitioning and formation placement for
//! Post-Scarcity RTS.
//!
//! This crate keeps a uniform grid over the playable world and answers the
//! questions the simulation asks every tick:
//! - Which entities of a kind are near a point (closest first)?
//! - Which entities lie inside a selection rectangle?
//! - Is a destination free of obstacles and reservation markers?
//! - Where should each member of a group stand for a given formation?
//!
//! Like the simulation core it follows lockstep rules:
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//! - Stable iteration order everywhere
//!
//! ## Crate Structure
//!
//! - [`index`] - Grid construction and membership bookkeeping
//! - [`cell`] - Per-cell membership lists
//! - [`motion`] - Periodic recheck of cells with moving entities
//! - [`search`] - Ring and rectangle searches
//! - [`reservation`] - Position reservation checks
//! - [`formation`] - Formation handlers and placement engine
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod cell;
pub mod components;
pub mod config;
pub mod error;
pub mod formation;
pub mod index;
pub mod math;
pub mod motion;
pub mod reservation;
pub mod search;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cell::{CellKey, SpatialCell};
    pub use crate::components::*;
    pub use crate::config::{SpatialConfig, WorldBounds, TICK_RATE};
    pub use crate::error::{ConfigError, Result, SpatialError};
    pub use crate::formation::{
        FormationDefaults, FormationDescriptor, FormationHandler, FormationPlacementEngine,
        FormationType, PathingValidity, Placement, PlacementAgent, PlacementRequest,
    };
    pub use crate::index::{IndexSnapshot, SpatialIndex};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::search::{SearchHit, SearchRect, TargetCandidate, TargetSearch};
}
