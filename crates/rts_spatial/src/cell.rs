//! Grid cells of the spatial index.
//!
//! A cell is a fixed-size square region identified by its lower-left
//! corner. It owns the membership lists for entities, obstacles and
//! reservation markers, plus the sub-list of resident entities that are
//! currently moving. Membership order is insertion order, which keeps
//! iteration identical across replicas fed the same events.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, MarkerId, ObstacleId};
use crate::math::{Fixed, Vec2Fixed};

/// Lower-left integer corner of a cell; unique per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    /// Lower-left x coordinate.
    pub x: i32,
    /// Lower-left y coordinate.
    pub y: i32,
}

impl CellKey {
    /// Create a new cell key.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// How a membership change affected the cell's set of moving residents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionChange {
    /// The moving list went from empty to non-empty.
    Started,
    /// The moving list became empty.
    Stopped,
    /// Tracking state of the cell did not change.
    Unchanged,
}

/// One square region of the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialCell {
    key: CellKey,
    size: i32,
    neighbors: Vec<CellKey>,
    entities: Vec<EntityId>,
    obstacles: Vec<ObstacleId>,
    markers: Vec<MarkerId>,
    moving: Vec<EntityId>,
}

impl SpatialCell {
    /// Create an empty cell. Neighbors are assigned by the index.
    #[must_use]
    pub fn new(key: CellKey, size: i32) -> Self {
        Self {
            key,
            size,
            neighbors: Vec::with_capacity(8),
            entities: Vec::new(),
            obstacles: Vec::new(),
            markers: Vec::new(),
            moving: Vec::new(),
        }
    }

    /// The cell's key.
    #[must_use]
    pub const fn key(&self) -> CellKey {
        self.key
    }

    /// Side length in world units.
    #[must_use]
    pub const fn size(&self) -> i32 {
        self.size
    }

    /// Neighboring cells (up to 8, fewer at world edges).
    #[must_use]
    pub fn neighbors(&self) -> &[CellKey] {
        &self.neighbors
    }

    pub(crate) fn set_neighbors(&mut self, neighbors: Vec<CellKey>) {
        self.neighbors = neighbors;
    }

    /// Entities currently assigned to this cell.
    #[must_use]
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Obstacles overlapping this cell.
    #[must_use]
    pub fn obstacles(&self) -> &[ObstacleId] {
        &self.obstacles
    }

    /// Reservation markers overlapping this cell.
    #[must_use]
    pub fn markers(&self) -> &[MarkerId] {
        &self.markers
    }

    /// Resident entities currently in motion.
    #[must_use]
    pub fn moving(&self) -> &[EntityId] {
        &self.moving
    }

    /// Whether the cell has moving residents and needs periodic rechecks.
    #[must_use]
    pub fn has_movers(&self) -> bool {
        !self.moving.is_empty()
    }

    /// Whether `position` lies inside the cell.
    ///
    /// Lower bounds are inclusive and upper bounds exclusive, matching the
    /// index's floor-division cell assignment exactly.
    #[must_use]
    pub fn is_inside(&self, position: Vec2Fixed) -> bool {
        let min_x = Fixed::from_num(self.key.x);
        let min_y = Fixed::from_num(self.key.y);
        let size = Fixed::from_num(self.size);
        position.x >= min_x
            && position.x < min_x + size
            && position.y >= min_y
            && position.y < min_y + size
    }

    /// Whether a circle overlaps the cell, using the distance from the
    /// circle's center to the closest point of the cell.
    #[must_use]
    pub fn overlaps_circle(&self, center: Vec2Fixed, radius: Fixed) -> bool {
        let min_x = Fixed::from_num(self.key.x);
        let min_y = Fixed::from_num(self.key.y);
        let size = Fixed::from_num(self.size);
        let closest = Vec2Fixed::new(
            center.x.clamp(min_x, min_x + size),
            center.y.clamp(min_y, min_y + size),
        );
        center.distance_squared(closest) <= radius.saturating_mul(radius)
    }

    /// Add an entity; if it is already moving, start tracking it.
    pub fn add_entity(&mut self, id: EntityId, moving: bool) -> MotionChange {
        if !self.entities.contains(&id) {
            self.entities.push(id);
        }
        if moving {
            self.start_tracking(id)
        } else {
            MotionChange::Unchanged
        }
    }

    /// Remove an entity and stop tracking it.
    pub fn remove_entity(&mut self, id: EntityId) -> MotionChange {
        if let Some(pos) = self.entities.iter().position(|&e| e == id) {
            self.entities.remove(pos);
        }
        self.stop_tracking(id)
    }

    /// Begin tracking a resident entity's motion.
    pub fn start_tracking(&mut self, id: EntityId) -> MotionChange {
        if self.moving.contains(&id) || !self.entities.contains(&id) {
            return MotionChange::Unchanged;
        }
        self.moving.push(id);
        if self.moving.len() == 1 {
            MotionChange::Started
        } else {
            MotionChange::Unchanged
        }
    }

    /// Stop tracking an entity's motion.
    pub fn stop_tracking(&mut self, id: EntityId) -> MotionChange {
        let Some(pos) = self.moving.iter().position(|&e| e == id) else {
            return MotionChange::Unchanged;
        };
        self.moving.remove(pos);
        if self.moving.is_empty() {
            MotionChange::Stopped
        } else {
            MotionChange::Unchanged
        }
    }

    pub(crate) fn add_obstacle(&mut self, id: ObstacleId) {
        if !self.obstacles.contains(&id) {
            self.obstacles.push(id);
        }
    }

    pub(crate) fn remove_obstacle(&mut self, id: ObstacleId) -> bool {
        let before = self.obstacles.len();
        self.obstacles.retain(|&o| o != id);
        self.obstacles.len() != before
    }

    pub(crate) fn add_marker(&mut self, id: MarkerId) {
        if !self.markers.contains(&id) {
            self.markers.push(id);
        }
    }

    pub(crate) fn remove_marker(&mut self, id: MarkerId) -> bool {
        let before = self.markers.len();
        self.markers.retain(|&m| m != id);
        self.markers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> SpatialCell {
        SpatialCell::new(CellKey::new(10, 20), 10)
    }

    #[test]
    fn test_is_inside_inclusive_lower_exclusive_upper() {
        let cell = cell();
        assert!(cell.is_inside(Vec2Fixed::from_ints(10, 20)));
        assert!(cell.is_inside(Vec2Fixed::from_ints(19, 29)));
        assert!(!cell.is_inside(Vec2Fixed::from_ints(20, 25)));
        assert!(!cell.is_inside(Vec2Fixed::from_ints(15, 30)));
        assert!(!cell.is_inside(Vec2Fixed::from_ints(9, 25)));
    }

    #[test]
    fn test_overlaps_circle_closest_point() {
        let cell = cell();
        // Center inside the cell.
        assert!(cell.overlaps_circle(Vec2Fixed::from_ints(15, 25), Fixed::ZERO));
        // 3 units left of the left edge.
        assert!(cell.overlaps_circle(Vec2Fixed::from_ints(7, 25), Fixed::from_num(3)));
        assert!(!cell.overlaps_circle(Vec2Fixed::from_ints(7, 25), Fixed::from_num(2)));
        // Diagonal from the corner (10, 20): distance 5.
        assert!(cell.overlaps_circle(Vec2Fixed::from_ints(7, 16), Fixed::from_num(5)));
        assert!(!cell.overlaps_circle(Vec2Fixed::from_ints(7, 16), Fixed::from_num(4)));
    }

    #[test]
    fn test_add_moving_entity_starts_tracking() {
        let mut cell = cell();
        assert_eq!(cell.add_entity(1, true), MotionChange::Started);
        assert_eq!(cell.add_entity(2, true), MotionChange::Unchanged);
        assert_eq!(cell.moving(), &[1, 2]);
    }

    #[test]
    fn test_remove_last_mover_stops_tracking() {
        let mut cell = cell();
        cell.add_entity(1, true);
        cell.add_entity(2, false);
        assert_eq!(cell.remove_entity(2), MotionChange::Unchanged);
        assert_eq!(cell.remove_entity(1), MotionChange::Stopped);
        assert!(!cell.has_movers());
        assert!(cell.entities().is_empty());
    }

    #[test]
    fn test_add_remove_restores_membership() {
        let mut cell = cell();
        cell.add_entity(1, false);
        cell.add_entity(2, true);
        let before = cell.clone();

        cell.add_entity(3, true);
        cell.remove_entity(3);
        assert_eq!(cell, before);
    }

    #[test]
    fn test_tracking_requires_residency() {
        let mut cell = cell();
        assert_eq!(cell.start_tracking(9), MotionChange::Unchanged);
        assert!(cell.moving().is_empty());
    }

    #[test]
    fn test_obstacle_and_marker_membership() {
        let mut cell = cell();
        cell.add_obstacle(ObstacleId(1));
        cell.add_obstacle(ObstacleId(1));
        cell.add_marker(MarkerId(4));
        assert_eq!(cell.obstacles(), &[ObstacleId(1)]);
        assert!(cell.remove_obstacle(ObstacleId(1)));
        assert!(!cell.remove_obstacle(ObstacleId(1)));
        assert!(cell.remove_marker(MarkerId(4)));
        assert!(cell.markers().is_empty());
    }
}
