//! Test fixtures and helpers.
//!
//! Pre-built worlds, entities and pathing stubs
//! for consistent testing.

use fixed::types::I32F32;
use rts_spatial::components::{
    AreaMask, EntityId, EntityKind, EntityRecord, Obstacle, ObstacleId,
};
use rts_spatial::config::{SpatialConfig, WorldBounds};
use rts_spatial::formation::{PathingValidity, PlacementAgent};
use rts_spatial::index::SpatialIndex;
use rts_spatial::math::{Fixed, Vec2Fixed};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Integer world position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Square world from the origin to `(size, size)`.
///
/// # Panics
///
/// Panics if `size` is not a positive multiple of `cell_size`.
#[must_use]
pub fn square_world(size: i32, cell_size: i32) -> SpatialIndex {
    SpatialIndex::new(SpatialConfig::new(WorldBounds::new(
        (0, 0),
        (size, size),
        cell_size,
    )))
    .expect("fixture world bounds must be valid")
}

/// The 100x100 world with 10-unit cells used by most scenarios.
#[must_use]
pub fn small_world() -> SpatialIndex {
    square_world(100, 10)
}

/// Searchable stationary unit.
#[must_use]
pub fn unit_at(id: EntityId, x: i32, y: i32) -> EntityRecord {
    EntityRecord::new(id, EntityKind::Unit, pos(x, y))
}

/// Searchable building.
#[must_use]
pub fn building_at(id: EntityId, x: i32, y: i32) -> EntityRecord {
    EntityRecord::new(id, EntityKind::Building, pos(x, y))
}

/// Obstacle blocking every area type for every command.
#[must_use]
pub fn rock(id: u64, x: i32, y: i32, radius: i32) -> Obstacle {
    Obstacle {
        id: ObstacleId(id),
        center: pos(x, y),
        radius: fixed(radius),
        area_mask: AreaMask::ALL,
        explicit_commands_only: false,
    }
}

/// `count` agents of `radius` standing in a line along the x axis.
#[must_use]
pub fn agents_in_line(count: i32, origin: Vec2Fixed, radius: Fixed) -> Vec<PlacementAgent> {
    (0..count)
        .map(|i| {
            let offset = Vec2Fixed::new(radius * Fixed::from_num(2 * i), Fixed::ZERO);
            PlacementAgent::new(origin + offset, radius, AreaMask::ALL)
        })
        .collect()
}

/// Pathing stub where every position is walkable.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPathing;

impl PathingValidity for OpenPathing {
    fn try_get_valid_position(
        &self,
        center: Vec2Fixed,
        _radius: Fixed,
        _area_mask: AreaMask,
    ) -> Option<Vec2Fixed> {
        Some(center)
    }
}

/// Pathing stub that rejects positions outside a rectangle.
#[derive(Debug, Clone, Copy)]
pub struct BoundedPathing {
    /// Inclusive lower-left corner.
    pub min: Vec2Fixed,
    /// Exclusive upper-right corner.
    pub max: Vec2Fixed,
}

impl BoundedPathing {
    /// Walkable area matching `bounds`.
    #[must_use]
    pub fn for_world(bounds: &WorldBounds) -> Self {
        Self {
            min: Vec2Fixed::from_ints(bounds.lower_left.0, bounds.lower_left.1),
            max: Vec2Fixed::from_ints(bounds.upper_right.0, bounds.upper_right.1),
        }
    }
}

impl PathingValidity for BoundedPathing {
    fn try_get_valid_position(
        &self,
        center: Vec2Fixed,
        radius: Fixed,
        _area_mask: AreaMask,
    ) -> Option<Vec2Fixed> {
        let inside = center.x - radius >= self.min.x
            && center.y - radius >= self.min.y
            && center.x + radius < self.max.x
            && center.y + radius < self.max.y;
        inside.then_some(center)
    }
}

/// Pathing stub where nothing is walkable.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockedPathing;

impl PathingValidity for BlockedPathing {
    fn try_get_valid_position(&self, _: Vec2Fixed, _: Fixed, _: AreaMask) -> Option<Vec2Fixed> {
        None
    }
}
