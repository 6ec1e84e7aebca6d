//! Entity searches over the spatial index.
//!
//! [`SpatialIndex::nearest_or_any`] performs an expanding-ring search: it
//! starts at the source cell and its immediate neighbors, then widens to
//! the unvisited neighbors of the current ring until the covered distance
//! reaches the search radius. [`SpatialIndex::search_rectangle`] scans the
//! cells overlapping an axis-aligned rectangle.
//!
//! Searches never mutate the index.

use serde::{Deserialize, Serialize};

use crate::cell::CellKey;
use crate::components::{EntityId, EntityKind, EntityRecord, KindFilter};
use crate::error::{Result, SpatialError};
use crate::index::SpatialIndex;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Parameters of a radius search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSearch {
    /// Search origin.
    pub origin: Vec2Fixed,
    /// Minimum distance (inclusive).
    #[serde(with = "fixed_serde")]
    pub min_radius: Fixed,
    /// Maximum distance (inclusive).
    #[serde(with = "fixed_serde")]
    pub max_radius: Fixed,
    /// Maximum number of hits to return (at least 1).
    pub max_count: usize,
    /// Entity kinds to consider.
    pub kinds: KindFilter,
    /// Return the closest hits; when false the search may stop at the first
    /// `max_count` hits found, in iteration order.
    pub prefer_closest: bool,
    /// Forwarded to the validity test.
    pub is_explicit_command: bool,
}

impl TargetSearch {
    /// Closest single entity of any kind within `max_radius`.
    #[must_use]
    pub const fn new(origin: Vec2Fixed, max_radius: Fixed) -> Self {
        Self {
            origin,
            min_radius: Fixed::ZERO,
            max_radius,
            max_count: 1,
            kinds: KindFilter::ANY,
            prefer_closest: true,
            is_explicit_command: false,
        }
    }

    /// Ignore entities closer than `min_radius`.
    #[must_use]
    pub const fn with_min_radius(mut self, min_radius: Fixed) -> Self {
        self.min_radius = min_radius;
        self
    }

    /// Return up to `max_count` hits.
    #[must_use]
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count.max(1);
        self
    }

    /// Restrict the entity kinds considered.
    #[must_use]
    pub const fn with_kinds(mut self, kinds: KindFilter) -> Self {
        self.kinds = kinds;
        self
    }

    /// Choose between closest hits and early exit.
    ///
    /// Early exit returns hits in cell iteration order, which depends on
    /// membership order; lockstep code should keep the default `true`.
    #[must_use]
    pub const fn prefer_closest(mut self, prefer_closest: bool) -> Self {
        self.prefer_closest = prefer_closest;
        self
    }

    /// Mark the search as issued by an explicit command.
    #[must_use]
    pub const fn explicit(mut self, is_explicit_command: bool) -> Self {
        self.is_explicit_command = is_explicit_command;
        self
    }
}

/// An entity offered to a search's validity test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCandidate {
    /// Candidate entity.
    pub entity: EntityId,
    /// Candidate kind.
    pub kind: EntityKind,
    /// Candidate position.
    pub position: Vec2Fixed,
    /// Whether the search comes from an explicit command.
    pub is_explicit_command: bool,
}

/// An accepted search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Matching entity.
    pub entity: EntityId,
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity position at search time.
    pub position: Vec2Fixed,
    /// Squared distance from the search origin.
    #[serde(with = "fixed_serde")]
    pub distance_squared: Fixed,
}

/// Hits kept sorted by distance, ties broken by entity id.
#[derive(Debug, Clone, Default)]
pub struct SortedHits {
    hits: Vec<SearchHit>,
    capacity: Option<usize>,
}

impl SortedHits {
    /// Collection keeping only the closest `capacity` hits.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self {
            hits: Vec::with_capacity(capacity.min(64)),
            capacity: Some(capacity),
        }
    }

    /// Collection keeping every hit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Insert a hit at its sorted position, evicting the farthest hit when
    /// over capacity.
    pub fn insert(&mut self, hit: SearchHit) {
        let key = (hit.distance_squared, hit.entity);
        if let (Some(cap), Some(worst)) = (self.capacity, self.hits.last()) {
            if self.hits.len() >= cap && key >= (worst.distance_squared, worst.entity) {
                return;
            }
        }
        let at = self
            .hits
            .partition_point(|h| (h.distance_squared, h.entity) < key);
        self.hits.insert(at, hit);
        if let Some(cap) = self.capacity {
            self.hits.truncate(cap);
        }
    }

    /// Number of hits held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Whether no hit is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Whether the bounded capacity is reached.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.hits.len() >= cap)
    }

    /// Squared distance of the farthest hit held.
    #[must_use]
    pub fn worst_distance_squared(&self) -> Option<Fixed> {
        self.hits.last().map(|h| h.distance_squared)
    }

    /// The hits, closest first.
    #[must_use]
    pub fn into_vec(self) -> Vec<SearchHit> {
        self.hits
    }
}

/// Breadth-first traversal of cells in rings around a source cell.
///
/// The first ring is the source cell plus its neighbors; each following
/// ring holds the unvisited neighbors of the previous one. After ring `k`
/// every point within `(k + 1) * cell_size` of any point in the source cell
/// has been covered.
pub(crate) struct RingTraversal {
    visited: Vec<bool>,
    ring: Vec<CellKey>,
    depth: u32,
}

impl RingTraversal {
    pub(crate) fn start(index: &SpatialIndex, source: CellKey) -> Self {
        let mut visited = vec![false; index.cell_count()];
        let source_slot = index.slot_of(source);
        visited[source_slot] = true;

        let mut ring = vec![source];
        for &neighbor in index.cell_at_slot(source_slot).neighbors() {
            let slot = index.slot_of(neighbor);
            if !visited[slot] {
                visited[slot] = true;
                ring.push(neighbor);
            }
        }

        Self {
            visited,
            ring,
            depth: 0,
        }
    }

    pub(crate) fn ring(&self) -> &[CellKey] {
        &self.ring
    }

    /// Distance guaranteed covered by the rings visited so far.
    pub(crate) fn covered(&self, cell_size: Fixed) -> Fixed {
        cell_size.saturating_mul(Fixed::from_num(self.depth + 1))
    }

    /// Move to the next ring. Returns `false` when no unvisited cell remains.
    pub(crate) fn advance(&mut self, index: &SpatialIndex) -> bool {
        let mut next = Vec::new();
        for &key in &self.ring {
            for &neighbor in index.cell_at_slot(index.slot_of(key)).neighbors() {
                let slot = index.slot_of(neighbor);
                if !self.visited[slot] {
                    self.visited[slot] = true;
                    next.push(neighbor);
                }
            }
        }
        if next.is_empty() {
            return false;
        }
        self.ring = next;
        self.depth += 1;
        true
    }
}

/// Axis-aligned rectangle in world space (inclusive on all edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRect {
    /// Minimum corner.
    pub min: Vec2Fixed,
    /// Maximum corner.
    pub max: Vec2Fixed,
}

impl SearchRect {
    /// Rectangle spanning two arbitrary corners.
    #[must_use]
    pub fn from_corners(a: Vec2Fixed, b: Vec2Fixed) -> Self {
        Self {
            min: Vec2Fixed::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2Fixed::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Whether `position` lies inside the rectangle.
    #[must_use]
    pub fn contains(&self, position: Vec2Fixed) -> bool {
        position.x >= self.min.x
            && position.x <= self.max.x
            && position.y >= self.min.y
            && position.y <= self.max.y
    }
}

impl SpatialIndex {
    /// Find the nearest (or any) entities matching `search` and `validity`.
    ///
    /// Hits are returned closest first. With `prefer_closest` the search
    /// stops once the covered distance reaches `max_radius`, or once
    /// `max_count` hits are held that no unvisited entity could beat.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::CellNotFound`] if the origin lies outside the
    /// world and [`SpatialError::TargetNotFound`] if nothing matched.
    pub fn nearest_or_any<F>(&self, search: &TargetSearch, mut validity: F) -> Result<Vec<SearchHit>>
    where
        F: FnMut(&TargetCandidate) -> bool,
    {
        let source = self.locate(search.origin)?;
        let min_sq = search.min_radius.saturating_mul(search.min_radius);
        let max_sq = search.max_radius.saturating_mul(search.max_radius);
        let max_count = search.max_count.max(1);
        let cell_size = self.cell_size();

        let mut hits = if search.prefer_closest {
            SortedHits::bounded(max_count)
        } else {
            SortedHits::unbounded()
        };
        let mut rings = RingTraversal::start(self, source);

        loop {
            for &key in rings.ring() {
                let Some(cell) = self.cell(key) else {
                    continue;
                };
                for &id in cell.entities() {
                    let Some(record) = self.entity(id) else {
                        continue;
                    };
                    if !record.searchable || !search.kinds.accepts(record.kind) {
                        continue;
                    }

                    let distance_squared = record.position.distance_squared(search.origin);
                    if distance_squared < min_sq || distance_squared > max_sq {
                        continue;
                    }

                    let candidate = TargetCandidate {
                        entity: id,
                        kind: record.kind,
                        position: record.position,
                        is_explicit_command: search.is_explicit_command,
                    };
                    if !validity(&candidate) {
                        continue;
                    }

                    hits.insert(SearchHit {
                        entity: id,
                        kind: record.kind,
                        position: record.position,
                        distance_squared,
                    });

                    if !search.prefer_closest && hits.len() >= max_count {
                        return Ok(hits.into_vec());
                    }
                }
            }

            let covered = rings.covered(cell_size);
            if covered >= search.max_radius {
                break;
            }
            if hits.is_full()
                && hits
                    .worst_distance_squared()
                    .is_some_and(|worst| worst <= covered.saturating_mul(covered))
            {
                break;
            }
            if !rings.advance(self) {
                break;
            }
        }

        if hits.is_empty() {
            Err(SpatialError::TargetNotFound)
        } else {
            Ok(hits.into_vec())
        }
    }

    /// Entities inside `rect` of the requested kinds that pass `filter`.
    ///
    /// Results are in cell row-major order, then membership order; they are
    /// not sorted by distance.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::CellNotFound`] if a corner of the rectangle
    /// has no owning cell.
    pub fn search_rectangle<F>(
        &self,
        rect: &SearchRect,
        kinds: KindFilter,
        mut filter: F,
    ) -> Result<Vec<EntityId>>
    where
        F: FnMut(&EntityRecord) -> bool,
    {
        let lower = self.locate(rect.min)?;
        let upper = self.locate(rect.max)?;
        let step = self.bounds().cell_size;
        let mut found = Vec::new();

        let mut y = lower.y;
        while y <= upper.y {
            let mut x = lower.x;
            while x <= upper.x {
                let key = CellKey::new(x, y);
                let cell = self.cell(key).ok_or(SpatialError::CellNotFound {
                    x: i64::from(x),
                    y: i64::from(y),
                })?;
                for &id in cell.entities() {
                    let Some(record) = self.entity(id) else {
                        continue;
                    };
                    if kinds.accepts(record.kind) && rect.contains(record.position) && filter(record)
                    {
                        found.push(id);
                    }
                }
                x += step;
            }
            y += step;
        }

        Ok(found)
    }
}
