//! The spatial index: a uniform grid of cells over the world bounds.
//!
//! The index owns every [`SpatialCell`], routes entity, obstacle and
//! marker membership changes to the right cells, and drives the periodic
//! motion recheck that migrates moving entities between cells. Queries
//! live in [`crate::search`] and [`crate::reservation`].
//!
//! # Determinism
//!
//! Cells are stored in row-major order, membership lists keep insertion
//! order, and motion rechecks fire in cell key order. Two replicas fed the
//! same sequence of calls end up with identical state, which
//! [`SpatialIndex::state_hash`] can confirm.
//!
//! # Example
//!
//! ```
//! use rts_spatial::config::{SpatialConfig, WorldBounds};
//! use rts_spatial::components::{EntityKind, EntityRecord};
//! use rts_spatial::index::SpatialIndex;
//! use rts_spatial::math::Vec2Fixed;
//!
//! let config = SpatialConfig::new(WorldBounds::new((0, 0), (100, 100), 10));
//! let mut index = SpatialIndex::new(config).unwrap();
//! assert_eq!(index.cell_count(), 100);
//!
//! let unit = EntityRecord::new(1, EntityKind::Unit, Vec2Fixed::from_ints(5, 5));
//! let cell = index.add(unit).unwrap();
//! assert_eq!(index.locate(Vec2Fixed::from_ints(5, 5)).unwrap(), cell);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::cell::{CellKey, MotionChange, SpatialCell};
use crate::components::{
    EntityId, EntityRecord, MarkerId, Obstacle, ObstacleId, ReservationMarker,
};
use crate::config::{SpatialConfig, WorldBounds};
use crate::error::{ConfigError, Result, SpatialError};
use crate::math::{Fixed, Vec2Fixed};
use crate::motion::MotionScheduler;

/// Neighbor offsets in cell units, in a fixed order.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// An entity mirror plus the cell it is currently assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackedEntity {
    record: EntityRecord,
    cell: CellKey,
}

/// A stored obstacle or marker plus every cell it overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Placed<T> {
    item: T,
    cells: Vec<CellKey>,
}

/// Grid of cells covering the world, with entity, obstacle and marker
/// membership.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    config: SpatialConfig,
    columns: u32,
    rows: u32,
    cells: Vec<SpatialCell>,
    entities: HashMap<EntityId, TrackedEntity>,
    obstacles: HashMap<ObstacleId, Placed<Obstacle>>,
    markers: HashMap<MarkerId, Placed<ReservationMarker>>,
    motion: MotionScheduler,
    tick: u64,
}

impl SpatialIndex {
    /// Build the grid for `config`.
    ///
    /// Allocates one cell per grid position and assigns neighbor sets by
    /// coordinate arithmetic.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid; an index
    /// is never built with a non-positive cell size or malformed bounds.
    pub fn new(config: SpatialConfig) -> std::result::Result<Self, ConfigError> {
        if let Err(err) = config.validate() {
            tracing::error!(error = %err, "Rejected spatial index configuration");
            return Err(err);
        }

        let bounds = config.bounds;
        let columns = bounds.columns();
        let rows = bounds.rows();
        let size = bounds.cell_size;

        let mut cells = Vec::with_capacity(columns as usize * rows as usize);
        for row in 0..rows {
            for col in 0..columns {
                let key = CellKey::new(
                    bounds.lower_left.0 + col as i32 * size,
                    bounds.lower_left.1 + row as i32 * size,
                );
                let mut cell = SpatialCell::new(key, size);

                let neighbors = NEIGHBOR_OFFSETS
                    .iter()
                    .filter_map(|&(dx, dy)| {
                        let nc = col as i64 + i64::from(dx);
                        let nr = row as i64 + i64::from(dy);
                        let in_grid =
                            nc >= 0 && nr >= 0 && nc < i64::from(columns) && nr < i64::from(rows);
                        in_grid.then(|| CellKey::new(key.x + dx * size, key.y + dy * size))
                    })
                    .collect();
                cell.set_neighbors(neighbors);
                cells.push(cell);
            }
        }

        tracing::debug!(columns, rows, cell_size = size, "Spatial index initialized");

        Ok(Self {
            config,
            columns,
            rows,
            cells,
            entities: HashMap::new(),
            obstacles: HashMap::new(),
            markers: HashMap::new(),
            motion: MotionScheduler::new(config.motion_recheck_interval),
            tick: 0,
        })
    }

    /// World bounds covered by the grid.
    #[must_use]
    pub const fn bounds(&self) -> WorldBounds {
        self.config.bounds
    }

    /// Configuration the index was built with.
    #[must_use]
    pub const fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Number of cells in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cell side length as a fixed-point value.
    #[must_use]
    pub fn cell_size(&self) -> Fixed {
        self.config.bounds.cell_size_fixed()
    }

    /// Current simulation tick as seen by the motion tracker.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Iterate over all cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &SpatialCell> {
        self.cells.iter()
    }

    /// Get a cell by key.
    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&SpatialCell> {
        self.slot(key).map(|i| &self.cells[i])
    }

    fn cell_mut(&mut self, key: CellKey) -> Option<&mut SpatialCell> {
        self.slot(key).map(move |i| &mut self.cells[i])
    }

    /// Row-major storage slot for a key, if the key names a cell.
    fn slot(&self, key: CellKey) -> Option<usize> {
        let bounds = self.config.bounds;
        let dx = i64::from(key.x) - i64::from(bounds.lower_left.0);
        let dy = i64::from(key.y) - i64::from(bounds.lower_left.1);
        let size = i64::from(bounds.cell_size);
        if dx < 0 || dy < 0 || dx % size != 0 || dy % size != 0 {
            return None;
        }
        let col = dx / size;
        let row = dy / size;
        if col >= i64::from(self.columns) || row >= i64::from(self.rows) {
            return None;
        }
        Some((row * i64::from(self.columns) + col) as usize)
    }

    /// Storage slot of a key known to be valid.
    pub(crate) fn slot_of(&self, key: CellKey) -> usize {
        self.slot(key).unwrap_or_default()
    }

    pub(crate) fn cell_at_slot(&self, slot: usize) -> &SpatialCell {
        &self.cells[slot]
    }

    /// Find the cell owning `position`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::CellNotFound`] if the position lies outside
    /// the world bounds.
    pub fn locate(&self, position: Vec2Fixed) -> Result<CellKey> {
        let bounds = self.config.bounds;
        let origin = bounds.origin();
        let size = bounds.cell_size_fixed();
        let not_found = || SpatialError::CellNotFound {
            x: position.x.to_num::<i64>(),
            y: position.y.to_num::<i64>(),
        };

        if position.x < origin.x || position.y < origin.y {
            return Err(not_found());
        }

        let col = ((position.x - origin.x) / size).floor().to_num::<i64>();
        let row = ((position.y - origin.y) / size).floor().to_num::<i64>();
        if col >= i64::from(self.columns) || row >= i64::from(self.rows) {
            return Err(not_found());
        }

        Ok(CellKey::new(
            bounds.lower_left.0 + col as i32 * bounds.cell_size,
            bounds.lower_left.1 + row as i32 * bounds.cell_size,
        ))
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Add an entity at its current position.
    ///
    /// If the entity is already moving, its new cell starts tracking it.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateId`] if the entity is already
    /// indexed and [`SpatialError::CellNotFound`] if its position lies
    /// outside the world.
    pub fn add(&mut self, record: EntityRecord) -> Result<CellKey> {
        if self.entities.contains_key(&record.id) {
            return Err(SpatialError::DuplicateId(record.id));
        }
        let key = self.locate(record.position).map_err(|err| {
            tracing::warn!(entity = record.id, "Entity added outside indexed world");
            err
        })?;

        self.entities.insert(
            record.id,
            TrackedEntity {
                record,
                cell: key,
            },
        );
        self.insert_into_cell(key, record.id, record.moving);
        Ok(key)
    }

    /// Remove an entity from the index.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownEntity`] if the entity is not indexed.
    pub fn remove(&mut self, id: EntityId) -> Result<EntityRecord> {
        let tracked = self
            .entities
            .remove(&id)
            .ok_or(SpatialError::UnknownEntity(id))?;
        self.remove_from_cell(tracked.cell, id);
        Ok(tracked.record)
    }

    /// Lifecycle hook: the entity became active in the simulation.
    ///
    /// # Errors
    ///
    /// See [`SpatialIndex::add`].
    pub fn on_entity_initiated(&mut self, record: EntityRecord) -> Result<CellKey> {
        self.add(record)
    }

    /// Lifecycle hook: the entity is no longer active.
    ///
    /// # Errors
    ///
    /// See [`SpatialIndex::remove`].
    pub fn on_entity_removed(&mut self, id: EntityId) -> Result<EntityRecord> {
        self.remove(id)
    }

    /// Sync an entity's position.
    ///
    /// Moving entities are migrated by the periodic recheck in
    /// [`SpatialIndex::tick`]; a stationary entity that was teleported is
    /// relocated immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownEntity`] if the entity is not indexed.
    pub fn set_entity_position(&mut self, id: EntityId, position: Vec2Fixed) -> Result<()> {
        let tracked = self
            .entities
            .get_mut(&id)
            .ok_or(SpatialError::UnknownEntity(id))?;
        tracked.record.position = position;
        if !tracked.record.moving {
            self.relocate(id);
        }
        Ok(())
    }

    /// Include or exclude an entity from searches.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownEntity`] if the entity is not indexed.
    pub fn set_entity_searchable(&mut self, id: EntityId, searchable: bool) -> Result<()> {
        let tracked = self
            .entities
            .get_mut(&id)
            .ok_or(SpatialError::UnknownEntity(id))?;
        tracked.record.searchable = searchable;
        Ok(())
    }

    /// Motion notification: the entity started moving.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownEntity`] if the entity is not indexed.
    pub fn on_motion_start(&mut self, id: EntityId) -> Result<()> {
        let tracked = self
            .entities
            .get_mut(&id)
            .ok_or(SpatialError::UnknownEntity(id))?;
        tracked.record.moving = true;
        let key = tracked.cell;

        let change = self
            .cell_mut(key)
            .map_or(MotionChange::Unchanged, |cell| cell.start_tracking(id));
        self.apply_motion_change(key, change);
        Ok(())
    }

    /// Motion notification: the entity stopped moving.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownEntity`] if the entity is not indexed.
    pub fn on_motion_stop(&mut self, id: EntityId) -> Result<()> {
        let tracked = self
            .entities
            .get_mut(&id)
            .ok_or(SpatialError::UnknownEntity(id))?;
        tracked.record.moving = false;
        let key = tracked.cell;

        let change = self
            .cell_mut(key)
            .map_or(MotionChange::Unchanged, |cell| cell.stop_tracking(id));
        self.apply_motion_change(key, change);
        self.relocate(id);
        Ok(())
    }

    /// Get an indexed entity's mirror.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id).map(|t| &t.record)
    }

    /// Cell an entity is currently assigned to.
    #[must_use]
    pub fn cell_of(&self, id: EntityId) -> Option<CellKey> {
        self.entities.get(&id).map(|t| t.cell)
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Move an entity to the cell owning its mirrored position, if it left
    /// its current one. Returns whether it migrated.
    fn relocate(&mut self, id: EntityId) -> bool {
        let Some(tracked) = self.entities.get(&id).copied() else {
            return false;
        };
        let inside = self
            .cell(tracked.cell)
            .is_some_and(|cell| cell.is_inside(tracked.record.position));
        if inside {
            return false;
        }

        match self.locate(tracked.record.position) {
            Ok(new_key) => {
                self.insert_into_cell(new_key, id, tracked.record.moving);
                self.remove_from_cell(tracked.cell, id);
                if let Some(t) = self.entities.get_mut(&id) {
                    t.cell = new_key;
                }
                tracing::trace!(entity = id, from = ?tracked.cell, to = ?new_key, "Entity migrated");
                true
            }
            Err(_) => {
                tracing::warn!(entity = id, cell = ?tracked.cell, "Entity left the indexed world");
                false
            }
        }
    }

    fn insert_into_cell(&mut self, key: CellKey, id: EntityId, moving: bool) {
        let change = self
            .cell_mut(key)
            .map_or(MotionChange::Unchanged, |cell| cell.add_entity(id, moving));
        self.apply_motion_change(key, change);
    }

    fn remove_from_cell(&mut self, key: CellKey, id: EntityId) {
        let change = self
            .cell_mut(key)
            .map_or(MotionChange::Unchanged, |cell| cell.remove_entity(id));
        self.apply_motion_change(key, change);
    }

    fn apply_motion_change(&mut self, key: CellKey, change: MotionChange) {
        match change {
            MotionChange::Started => self.motion.start(key, self.tick),
            MotionChange::Stopped => self.motion.cancel(key),
            MotionChange::Unchanged => {}
        }
    }

    // ------------------------------------------------------------------
    // Motion tracking
    // ------------------------------------------------------------------

    /// Advance one simulation tick and run every due motion recheck.
    ///
    /// Returns the number of entities migrated to a new cell.
    pub fn tick(&mut self) -> usize {
        self.tick += 1;
        let due = self.motion.take_due(self.tick);
        due.into_iter().map(|key| self.recheck_cell(key)).sum()
    }

    /// Whether a cell currently runs a motion recheck task.
    #[must_use]
    pub fn is_tracking_motion(&self, key: CellKey) -> bool {
        self.motion.is_scheduled(key)
    }

    /// Number of cells with a running motion recheck task.
    #[must_use]
    pub fn active_motion_tasks(&self) -> usize {
        self.motion.active()
    }

    /// Re-validate every mover of `key`, migrating those that left it.
    fn recheck_cell(&mut self, key: CellKey) -> usize {
        let Some(cell) = self.cell(key) else {
            return 0;
        };
        let movers = cell.moving().to_vec();
        let mut migrated = 0;

        for id in movers {
            if !self.entities.contains_key(&id) {
                // Destroyed without a removal event.
                self.remove_from_cell(key, id);
                continue;
            }
            if self.relocate(id) {
                migrated += 1;
            }
        }

        #[cfg(feature = "debug-validation")]
        if let Some(cell) = self.cell(key) {
            debug_assert_eq!(
                cell.has_movers(),
                self.motion.is_scheduled(key),
                "motion task state out of sync for {key:?}"
            );
        }

        migrated
    }

    // ------------------------------------------------------------------
    // Obstacles and reservation markers
    // ------------------------------------------------------------------

    /// Cells overlapped by a circle, found by ring expansion from the
    /// circle's center cell.
    ///
    /// Expansion continues from overlapping cells only and stops once a
    /// whole ring overlaps nothing.
    fn cells_overlapping(&self, center: Vec2Fixed, radius: Fixed) -> Result<Vec<CellKey>> {
        let start = self.locate(center)?;
        let mut visited = vec![false; self.cells.len()];
        let mut ring = vec![start];
        visited[self.slot_of(start)] = true;
        let mut covered = Vec::new();

        while !ring.is_empty() {
            let mut next = Vec::new();
            for key in ring {
                let cell = &self.cells[self.slot_of(key)];
                if !cell.overlaps_circle(center, radius) {
                    continue;
                }
                covered.push(key);
                for &neighbor in cell.neighbors() {
                    let slot = self.slot_of(neighbor);
                    if !visited[slot] {
                        visited[slot] = true;
                        next.push(neighbor);
                    }
                }
            }
            ring = next;
        }

        Ok(covered)
    }

    /// Register an obstacle in every cell it overlaps.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateId`] for an already registered id
    /// and [`SpatialError::CellNotFound`] if the center lies outside the
    /// world.
    pub fn register_obstacle(&mut self, obstacle: Obstacle) -> Result<()> {
        if self.obstacles.contains_key(&obstacle.id) {
            return Err(SpatialError::DuplicateId(obstacle.id.0));
        }
        let cells = self.cells_overlapping(obstacle.center, obstacle.radius)?;
        for &key in &cells {
            if let Some(cell) = self.cell_mut(key) {
                cell.add_obstacle(obstacle.id);
            }
        }
        tracing::debug!(obstacle = ?obstacle.id, cells = cells.len(), "Obstacle registered");
        self.obstacles.insert(
            obstacle.id,
            Placed {
                item: obstacle,
                cells,
            },
        );
        Ok(())
    }

    /// Removal notification: evict the obstacle from every cell.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownObstacle`] if it was never registered.
    pub fn on_obstacle_removed(&mut self, id: ObstacleId) -> Result<Obstacle> {
        let placed = self
            .obstacles
            .remove(&id)
            .ok_or(SpatialError::UnknownObstacle(id))?;
        for &key in &placed.cells {
            if let Some(cell) = self.cell_mut(key) {
                cell.remove_obstacle(id);
            }
        }
        tracing::debug!(obstacle = ?id, "Obstacle evicted");
        Ok(placed.item)
    }

    /// Get a registered obstacle.
    #[must_use]
    pub fn obstacle(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(&id).map(|p| &p.item)
    }

    /// Place a reservation marker in every cell it overlaps.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::DuplicateId`] for an already placed id and
    /// [`SpatialError::CellNotFound`] if the position lies outside the world.
    pub fn place_marker(&mut self, marker: ReservationMarker) -> Result<()> {
        if self.markers.contains_key(&marker.id) {
            return Err(SpatialError::DuplicateId(marker.id.0));
        }
        let cells = self.cells_overlapping(marker.position, marker.radius)?;
        for &key in &cells {
            if let Some(cell) = self.cell_mut(key) {
                cell.add_marker(marker.id);
            }
        }
        self.markers.insert(
            marker.id,
            Placed {
                item: marker,
                cells,
            },
        );
        Ok(())
    }

    /// Move a marker to a new claimed position.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownMarker`] if the marker is not placed
    /// and [`SpatialError::CellNotFound`] if the new position lies outside
    /// the world; the marker is left where it was in that case.
    pub fn move_marker(&mut self, id: MarkerId, position: Vec2Fixed) -> Result<()> {
        let mut marker = *self.marker(id).ok_or(SpatialError::UnknownMarker(id))?;
        self.locate(position)?;
        self.remove_marker(id)?;
        marker.position = position;
        self.place_marker(marker)
    }

    /// Enable or disable a marker.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownMarker`] if the marker is not placed.
    pub fn set_marker_enabled(&mut self, id: MarkerId, enabled: bool) -> Result<()> {
        let placed = self
            .markers
            .get_mut(&id)
            .ok_or(SpatialError::UnknownMarker(id))?;
        placed.item.enabled = enabled;
        Ok(())
    }

    /// Remove a marker from every cell.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnknownMarker`] if the marker is not placed.
    pub fn remove_marker(&mut self, id: MarkerId) -> Result<ReservationMarker> {
        let placed = self
            .markers
            .remove(&id)
            .ok_or(SpatialError::UnknownMarker(id))?;
        for &key in &placed.cells {
            if let Some(cell) = self.cell_mut(key) {
                cell.remove_marker(id);
            }
        }
        Ok(placed.item)
    }

    /// Get a placed marker.
    #[must_use]
    pub fn marker(&self, id: MarkerId) -> Option<&ReservationMarker> {
        self.markers.get(&id).map(|p| &p.item)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Capture the index state in a deterministic order.
    #[must_use]
    pub fn snapshot(&self) -> IndexSnapshot {
        let cells = self
            .cells
            .iter()
            .filter(|c| {
                !(c.entities().is_empty() && c.obstacles().is_empty() && c.markers().is_empty())
            })
            .map(|c| CellSnapshot {
                key: c.key(),
                entities: c.entities().to_vec(),
                obstacles: c.obstacles().to_vec(),
                markers: c.markers().to_vec(),
                moving: c.moving().to_vec(),
            })
            .collect();

        let mut entities: Vec<EntityRecord> = self.entities.values().map(|t| t.record).collect();
        entities.sort_unstable_by_key(|r| r.id);

        IndexSnapshot {
            tick: self.tick,
            cells,
            entities,
        }
    }

    /// Hash of the current snapshot, for comparing replicas.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.snapshot().hash(&mut hasher);
        hasher.finish()
    }
}

/// Membership of one non-empty cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Cell key.
    pub key: CellKey,
    /// Resident entities in membership order.
    pub entities: Vec<EntityId>,
    /// Overlapping obstacles.
    pub obstacles: Vec<ObstacleId>,
    /// Overlapping reservation markers.
    pub markers: Vec<MarkerId>,
    /// Moving residents.
    pub moving: Vec<EntityId>,
}

/// Deterministic capture of a [`SpatialIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Tick the snapshot was taken at.
    pub tick: u64,
    /// Non-empty cells in row-major order.
    pub cells: Vec<CellSnapshot>,
    /// Entity mirrors sorted by id.
    pub entities: Vec<EntityRecord>,
}

impl IndexSnapshot {
    /// Encode the snapshot for byte-level replica comparison.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if serialization fails.
    pub fn to_bytes(&self) -> std::result::Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode a snapshot produced by [`IndexSnapshot::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns the decoder error for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AreaMask, EntityKind};

    fn index() -> SpatialIndex {
        SpatialIndex::new(SpatialConfig::new(WorldBounds::new((0, 0), (100, 100), 10))).unwrap()
    }

    fn unit(id: EntityId, x: i32, y: i32) -> EntityRecord {
        EntityRecord::new(id, EntityKind::Unit, Vec2Fixed::from_ints(x, y))
    }

    #[test]
    fn test_grid_has_one_cell_per_position() {
        let index = index();
        assert_eq!(index.cell_count(), 100);
        assert!(index.cell(CellKey::new(90, 90)).is_some());
        assert!(index.cell(CellKey::new(100, 0)).is_none());
        assert!(index.cell(CellKey::new(5, 0)).is_none());
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = SpatialConfig::new(WorldBounds::new((0, 0), (100, 100), -10));
        assert!(matches!(
            SpatialIndex::new(config),
            Err(ConfigError::NonPositiveCellSize(-10))
        ));
    }

    #[test]
    fn test_neighbor_counts() {
        let index = index();
        assert_eq!(index.cell(CellKey::new(0, 0)).unwrap().neighbors().len(), 3);
        assert_eq!(index.cell(CellKey::new(50, 0)).unwrap().neighbors().len(), 5);
        assert_eq!(index.cell(CellKey::new(50, 50)).unwrap().neighbors().len(), 8);
    }

    #[test]
    fn test_locate() {
        let index = index();
        assert_eq!(
            index.locate(Vec2Fixed::from_ints(5, 5)).unwrap(),
            CellKey::new(0, 0)
        );
        assert_eq!(
            index.locate(Vec2Fixed::from_ints(10, 99)).unwrap(),
            CellKey::new(10, 90)
        );
        assert!(matches!(
            index.locate(Vec2Fixed::from_ints(100, 5)),
            Err(SpatialError::CellNotFound { x: 100, y: 5 })
        ));
        assert!(index.locate(Vec2Fixed::from_ints(-1, 5)).is_err());
    }

    #[test]
    fn test_locate_negative_origin() {
        let config = SpatialConfig::new(WorldBounds::new((-50, -50), (50, 50), 10));
        let index = SpatialIndex::new(config).unwrap();
        let pos = Vec2Fixed::new(Fixed::from_num(-0.5), Fixed::from_num(-10));
        assert_eq!(index.locate(pos).unwrap(), CellKey::new(-10, -10));
    }

    #[test]
    fn test_add_and_remove_entity() {
        let mut index = index();
        let key = index.add(unit(1, 5, 5)).unwrap();
        assert_eq!(key, CellKey::new(0, 0));
        assert_eq!(index.cell(key).unwrap().entities(), &[1]);
        assert!(matches!(
            index.add(unit(1, 6, 6)),
            Err(SpatialError::DuplicateId(1))
        ));

        index.remove(1).unwrap();
        assert!(index.cell(key).unwrap().entities().is_empty());
        assert!(matches!(index.remove(1), Err(SpatialError::UnknownEntity(1))));
    }

    #[test]
    fn test_add_outside_world_is_reported() {
        let mut index = index();
        assert!(matches!(
            index.add(unit(1, 150, 5)),
            Err(SpatialError::CellNotFound { .. })
        ));
        assert_eq!(index.entity_count(), 0);
    }

    #[test]
    fn test_moving_entity_migrates_on_recheck() {
        let mut index = index();
        index.add(unit(1, 8, 5).moving()).unwrap();
        assert!(index.is_tracking_motion(CellKey::new(0, 0)));

        index
            .set_entity_position(1, Vec2Fixed::from_ints(12, 5))
            .unwrap();
        // Interval is two ticks.
        assert_eq!(index.tick(), 0);
        assert_eq!(index.cell_of(1), Some(CellKey::new(0, 0)));
        assert_eq!(index.tick(), 1);
        assert_eq!(index.cell_of(1), Some(CellKey::new(10, 0)));

        assert!(!index.is_tracking_motion(CellKey::new(0, 0)));
        assert!(index.is_tracking_motion(CellKey::new(10, 0)));
        assert!(index.cell(CellKey::new(0, 0)).unwrap().entities().is_empty());
    }

    #[test]
    fn test_motion_stop_cancels_task() {
        let mut index = index();
        index.add(unit(1, 5, 5)).unwrap();
        assert_eq!(index.active_motion_tasks(), 0);

        index.on_motion_start(1).unwrap();
        assert_eq!(index.active_motion_tasks(), 1);

        index.on_motion_stop(1).unwrap();
        assert_eq!(index.active_motion_tasks(), 0);
    }

    #[test]
    fn test_stationary_entity_relocated_immediately() {
        let mut index = index();
        index.add(unit(1, 5, 5)).unwrap();
        index
            .set_entity_position(1, Vec2Fixed::from_ints(25, 5))
            .unwrap();
        assert_eq!(index.cell_of(1), Some(CellKey::new(20, 0)));
        assert_eq!(index.active_motion_tasks(), 0);
    }

    #[test]
    fn test_motion_stop_settles_entity() {
        let mut index = index();
        index.add(unit(1, 5, 5).moving()).unwrap();
        index
            .set_entity_position(1, Vec2Fixed::from_ints(35, 5))
            .unwrap();
        assert_eq!(index.cell_of(1), Some(CellKey::new(0, 0)));

        // Stops before the recheck fires.
        index.on_motion_stop(1).unwrap();
        assert_eq!(index.cell_of(1), Some(CellKey::new(30, 0)));
        assert_eq!(index.active_motion_tasks(), 0);
    }

    #[test]
    fn test_mover_leaving_world_stays_put() {
        let mut index = index();
        index.add(unit(1, 95, 5).moving()).unwrap();
        index
            .set_entity_position(1, Vec2Fixed::from_ints(105, 5))
            .unwrap();
        index.tick();
        index.tick();
        assert_eq!(index.cell_of(1), Some(CellKey::new(90, 0)));
    }

    #[test]
    fn test_obstacle_registered_in_overlapping_cells() {
        let mut index = index();
        let obstacle = Obstacle {
            id: ObstacleId(1),
            center: Vec2Fixed::from_ints(50, 50),
            radius: Fixed::from_num(5),
            area_mask: AreaMask::ALL,
            explicit_commands_only: false,
        };
        index.register_obstacle(obstacle).unwrap();

        for key in [
            CellKey::new(40, 40),
            CellKey::new(50, 40),
            CellKey::new(40, 50),
            CellKey::new(50, 50),
        ] {
            assert_eq!(index.cell(key).unwrap().obstacles(), &[ObstacleId(1)]);
        }
        assert!(index.cell(CellKey::new(30, 50)).unwrap().obstacles().is_empty());

        index.on_obstacle_removed(ObstacleId(1)).unwrap();
        assert!(index.cells().all(|c| c.obstacles().is_empty()));
        assert!(index.on_obstacle_removed(ObstacleId(1)).is_err());
    }

    #[test]
    fn test_move_marker_updates_cells() {
        let mut index = index();
        let marker = ReservationMarker::new(
            MarkerId(3),
            Vec2Fixed::from_ints(15, 15),
            Fixed::ONE,
            AreaMask::ALL,
        );
        index.place_marker(marker).unwrap();
        assert_eq!(index.cell(CellKey::new(10, 10)).unwrap().markers(), &[MarkerId(3)]);

        index
            .move_marker(MarkerId(3), Vec2Fixed::from_ints(75, 75))
            .unwrap();
        assert!(index.cell(CellKey::new(10, 10)).unwrap().markers().is_empty());
        assert_eq!(index.cell(CellKey::new(70, 70)).unwrap().markers(), &[MarkerId(3)]);

        assert!(index
            .move_marker(MarkerId(3), Vec2Fixed::from_ints(500, 5))
            .is_err());
        assert!(index.marker(MarkerId(3)).is_some());
    }

    #[test]
    fn test_snapshot_round_trip_and_hash() {
        let mut index = index();
        index.add(unit(2, 35, 35)).unwrap();
        index.add(unit(1, 5, 5).moving()).unwrap();
        let snapshot = index.snapshot();
        assert_eq!(snapshot.cells.len(), 2);
        assert_eq!(snapshot.entities[0].id, 1);

        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(IndexSnapshot::from_bytes(&bytes).unwrap(), snapshot);

        let hash = index.state_hash();
        index.remove(2).unwrap();
        assert_ne!(index.state_hash(), hash);
    }
}
