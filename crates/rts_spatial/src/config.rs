//! Index configuration.
//!
//! Configuration is plain data that can be deserialized from RON, the
//! format the simulation uses for its data files. Validation happens once,
//! before an index is built; an index never exists with bad cell
//! arithmetic, since that would desynchronize replicas.
//!
//! # Example RON
//!
//! ```ron
//! SpatialConfig(
//!     bounds: WorldBounds(
//!         lower_left: (0, 0),
//!         upper_right: (100, 100),
//!         cell_size: 10,
//!     ),
//!     motion_recheck_interval: 2,
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::{Fixed, Vec2Fixed};

/// Simulation ticks per second.
pub const TICK_RATE: u32 = 20;

/// Default motion recheck interval: every 0.1 seconds of simulation time.
pub const DEFAULT_MOTION_RECHECK_TICKS: u32 = TICK_RATE / 10;

/// Largest squared distance representable by [`Fixed`].
const MAX_SQUARED_EXTENT: i32 = i32::MAX;

/// Rectangular world area covered by the index, in integer world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldBounds {
    /// Lower-left corner (inclusive).
    pub lower_left: (i32, i32),
    /// Upper-right corner (exclusive).
    pub upper_right: (i32, i32),
    /// Side length of each square cell.
    pub cell_size: i32,
}

impl WorldBounds {
    /// Create bounds from corners and cell size. Not validated.
    #[must_use]
    pub const fn new(lower_left: (i32, i32), upper_right: (i32, i32), cell_size: i32) -> Self {
        Self {
            lower_left,
            upper_right,
            cell_size,
        }
    }

    /// Check every bounds invariant.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the cell size is not positive, the
    /// corners are inverted or degenerate, or the extents are not a whole
    /// number of cells, or the world is too large for exact squared
    /// distances (diagonal above about 46 340 units).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_size <= 0 {
            return Err(ConfigError::NonPositiveCellSize(self.cell_size));
        }

        let (ll_x, ll_y) = self.lower_left;
        let (ur_x, ur_y) = self.upper_right;
        if ur_x <= ll_x || ur_y <= ll_y {
            return Err(ConfigError::MalformedBounds {
                ll_x,
                ll_y,
                ur_x,
                ur_y,
            });
        }

        let width = self.width();
        let height = self.height();
        let diagonal_sq = i128::from(width).pow(2) + i128::from(height).pow(2);
        if diagonal_sq > i128::from(MAX_SQUARED_EXTENT) {
            return Err(ConfigError::WorldTooLarge { width, height });
        }

        let cell_size = i64::from(self.cell_size);
        if width % cell_size != 0 || height % cell_size != 0 {
            return Err(ConfigError::BoundsNotDivisible {
                width,
                height,
                cell_size: self.cell_size,
            });
        }

        Ok(())
    }

    /// World width in world units.
    #[must_use]
    pub fn width(&self) -> i64 {
        i64::from(self.upper_right.0) - i64::from(self.lower_left.0)
    }

    /// World height in world units.
    #[must_use]
    pub fn height(&self) -> i64 {
        i64::from(self.upper_right.1) - i64::from(self.lower_left.1)
    }

    /// Number of cell columns.
    #[must_use]
    pub fn columns(&self) -> u32 {
        (self.width() / i64::from(self.cell_size)) as u32
    }

    /// Number of cell rows.
    #[must_use]
    pub fn rows(&self) -> u32 {
        (self.height() / i64::from(self.cell_size)) as u32
    }

    /// Lower-left corner as a fixed-point position.
    #[must_use]
    pub fn origin(&self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.lower_left.0, self.lower_left.1)
    }

    /// Cell size as a fixed-point length.
    #[must_use]
    pub fn cell_size_fixed(&self) -> Fixed {
        Fixed::from_num(self.cell_size)
    }
}

/// Full configuration for a [`SpatialIndex`](crate::index::SpatialIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// World area and grid resolution.
    pub bounds: WorldBounds,
    /// Ticks between motion rechecks of a cell with moving residents.
    #[serde(default = "default_recheck_interval")]
    pub motion_recheck_interval: u32,
}

const fn default_recheck_interval() -> u32 {
    DEFAULT_MOTION_RECHECK_TICKS
}

impl SpatialConfig {
    /// Configuration with the default motion recheck interval.
    #[must_use]
    pub const fn new(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            motion_recheck_interval: DEFAULT_MOTION_RECHECK_TICKS,
        }
    }

    /// Override the motion recheck interval.
    #[must_use]
    pub const fn with_recheck_interval(mut self, ticks: u32) -> Self {
        self.motion_recheck_interval = ticks;
        self
    }

    /// Parse and validate configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed text and any
    /// validation error from [`SpatialConfig::validate`].
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every configuration invariant.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bounds.validate()?;
        if self.motion_recheck_interval == 0 {
            return Err(ConfigError::ZeroRecheckInterval);
        }
        Ok(())
    }
}
