//! Error types for spatial queries and formation placement.
//!
//! Query outcomes such as [`SpatialError::CellNotFound`] or
//! [`SpatialError::TargetNotFound`] are ordinary result values that callers
//! branch on. Configuration problems are reported separately through
//! [`ConfigError`] and prevent an index from being constructed at all.

use thiserror::Error;

use crate::components::{EntityId, MarkerId, ObstacleId};
use crate::formation::FormationType;

/// Result type alias using [`SpatialError`].
pub type Result<T> = std::result::Result<T, SpatialError>;

/// Recoverable outcomes of index queries and formation placement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpatialError {
    /// The position lies outside every indexed cell.
    #[error("No cell owns position ({x}, {y})")]
    CellNotFound {
        /// Queried x coordinate (truncated).
        x: i64,
        /// Queried y coordinate (truncated).
        y: i64,
    },

    /// A search covered its whole radius without a match.
    #[error("No target found within search radius")]
    TargetNotFound,

    /// The position is claimed by another agent's destination marker.
    #[error("Position reserved by marker {0:?}")]
    PositionMarkerReserved(MarkerId),

    /// The position is blocked by an obstacle.
    #[error("Position reserved by obstacle {0:?}")]
    PositionObstacleReserved(ObstacleId),

    /// A placement ended with fewer points than requested.
    ///
    /// Returned as an error only when nothing was placed; partial results
    /// report it through `Placement::shortfall`.
    #[error("Formation placement failed for {formation:?}: placed {placed} of {requested}")]
    FormationPlacementFailed {
        /// Formation active when placement stopped.
        formation: FormationType,
        /// Number of points requested.
        requested: usize,
        /// Number of points actually placed.
        placed: usize,
    },

    /// The entity is not known to the index.
    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// The obstacle is not registered with the index.
    #[error("Unknown obstacle: {0:?}")]
    UnknownObstacle(ObstacleId),

    /// The reservation marker is not placed in the index.
    #[error("Unknown reservation marker: {0:?}")]
    UnknownMarker(MarkerId),

    /// An entity, obstacle or marker with the same id already exists.
    #[error("Duplicate id: {0}")]
    DuplicateId(u64),

    /// No handler is registered for the formation type.
    #[error("No handler registered for formation {0:?}")]
    UnregisteredFormation(FormationType),

    /// A formation property resolved to neither a value nor a default.
    #[error("Formation {formation:?} has no value or default for property '{property}'")]
    UnresolvedFormationProperty {
        /// Formation the lookup was made for.
        formation: FormationType,
        /// Requested property name.
        property: String,
    },
}

/// Fatal configuration errors detected once at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cell size must be strictly positive.
    #[error("Cell size must be positive, got {0}")]
    NonPositiveCellSize(i32),

    /// Upper-right corner must lie strictly above and right of lower-left.
    #[error("Malformed world bounds: lower-left ({ll_x}, {ll_y}), upper-right ({ur_x}, {ur_y})")]
    MalformedBounds {
        /// Lower-left x.
        ll_x: i32,
        /// Lower-left y.
        ll_y: i32,
        /// Upper-right x.
        ur_x: i32,
        /// Upper-right y.
        ur_y: i32,
    },

    /// World extents must be a whole number of cells.
    #[error("World extent {width}x{height} is not divisible by cell size {cell_size}")]
    BoundsNotDivisible {
        /// World width.
        width: i64,
        /// World height.
        height: i64,
        /// Configured cell size.
        cell_size: i32,
    },

    /// Squared distances across the world must fit in a `Fixed`.
    #[error("World extent {width}x{height} is too large: its squared diagonal exceeds the fixed-point range")]
    WorldTooLarge {
        /// World width.
        width: i64,
        /// World height.
        height: i64,
    },

    /// The motion recheck interval must be at least one tick.
    #[error("Motion recheck interval must be at least one tick")]
    ZeroRecheckInterval,

    /// Failed to parse RON configuration text.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
