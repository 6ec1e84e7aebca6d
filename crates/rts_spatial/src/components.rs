//! Plain data tracked by the spatial index.
//!
//! Entities are owned by the simulation; the index keeps only a small
//! mirror of the state it needs for searches. Obstacles and reservation
//! markers are stored by the index and read during reservation checks.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities.
pub type EntityId = u64;

/// Unique identifier for obstacles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleId(pub u64);

/// Unique identifier for reservation markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

/// Opaque area/terrain classification bitmask shared with the terrain system.
///
/// The index never interprets individual bits; it only tests intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AreaMask(pub u32);

impl AreaMask {
    /// Mask with no area types.
    pub const NONE: Self = Self(0);
    /// Mask matching every area type.
    pub const ALL: Self = Self(u32::MAX);

    /// Whether the two masks share any area type.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

/// Searchable entity subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Mobile unit.
    Unit,
    /// Static building.
    Building,
    /// Collectable resource.
    Resource,
    /// Anything else the simulation wants indexed.
    Other,
}

impl EntityKind {
    const fn bit(self) -> u8 {
        match self {
            Self::Unit => 1,
            Self::Building => 1 << 1,
            Self::Resource => 1 << 2,
            Self::Other => 1 << 3,
        }
    }
}

/// Set of entity kinds a search accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KindFilter(u8);

impl KindFilter {
    /// Accept every kind.
    pub const ANY: Self = Self(0b1111);

    /// Accept only `kind`.
    #[must_use]
    pub const fn only(kind: EntityKind) -> Self {
        Self(kind.bit())
    }

    /// Also accept `kind`.
    #[must_use]
    pub const fn with(self, kind: EntityKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Whether `kind` passes the filter.
    #[must_use]
    pub const fn accepts(self, kind: EntityKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl Default for KindFilter {
    fn default() -> Self {
        Self::ANY
    }
}

impl From<EntityKind> for KindFilter {
    fn from(kind: EntityKind) -> Self {
        Self::only(kind)
    }
}

/// Index-side mirror of an externally owned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity identifier.
    pub id: EntityId,
    /// Current world position.
    pub position: Vec2Fixed,
    /// Subtype used by search filters.
    pub kind: EntityKind,
    /// Whether searches may return this entity.
    pub searchable: bool,
    /// Whether the entity is currently moving.
    pub moving: bool,
}

impl EntityRecord {
    /// A searchable, stationary entity.
    #[must_use]
    pub const fn new(id: EntityId, kind: EntityKind, position: Vec2Fixed) -> Self {
        Self {
            id,
            position,
            kind,
            searchable: true,
            moving: false,
        }
    }

    /// Mark the entity as already moving.
    #[must_use]
    pub const fn moving(mut self) -> Self {
        self.moving = true;
        self
    }

    /// Exclude the entity from searches.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.searchable = false;
        self
    }
}

/// A static or dynamic obstacle blocking a circular area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Obstacle identifier.
    pub id: ObstacleId,
    /// Center of the blocked circle.
    pub center: Vec2Fixed,
    /// Radius of the blocked circle.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Area types the obstacle blocks.
    pub area_mask: AreaMask,
    /// Only blocks positions requested by explicit (player/AI issued) commands.
    pub explicit_commands_only: bool,
}

impl Obstacle {
    /// Whether the obstacle reserves the tested position.
    #[must_use]
    pub fn reserves(&self, query: &ReservationQuery) -> bool {
        if self.explicit_commands_only && !query.is_explicit_command {
            return false;
        }
        if !self.area_mask.intersects(query.area_mask) {
            return false;
        }
        let reach = self.radius.saturating_add(query.radius);
        self.center.distance_squared(query.position) <= reach.saturating_mul(reach)
    }
}

/// A claimed destination that other agents should keep clear of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationMarker {
    /// Marker identifier.
    pub id: MarkerId,
    /// Claimed position.
    pub position: Vec2Fixed,
    /// Radius kept clear around the position.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Area types the claiming agent moves on.
    pub area_mask: AreaMask,
    /// Disabled markers never reserve anything.
    pub enabled: bool,
}

impl ReservationMarker {
    /// An enabled marker.
    #[must_use]
    pub const fn new(id: MarkerId, position: Vec2Fixed, radius: Fixed, area_mask: AreaMask) -> Self {
        Self {
            id,
            position,
            radius,
            area_mask,
            enabled: true,
        }
    }

    /// Whether the marker reserves the tested position.
    #[must_use]
    pub fn reserves(&self, query: &ReservationQuery) -> bool {
        if !self.enabled || query.ignore_marker == Some(self.id) {
            return false;
        }
        if !self.area_mask.intersects(query.area_mask) {
            return false;
        }
        let reach = self.radius.saturating_add(query.radius);
        self.position.distance_squared(query.position) <= reach.saturating_mul(reach)
    }
}

/// Parameters of a position reservation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationQuery {
    /// Position to test.
    pub position: Vec2Fixed,
    /// Radius of the agent that wants the position.
    pub radius: Fixed,
    /// Area types the agent moves on.
    pub area_mask: AreaMask,
    /// Whether the request comes from an explicit command.
    pub is_explicit_command: bool,
    /// Marker to disregard, usually the agent's own current claim.
    pub ignore_marker: Option<MarkerId>,
}

impl ReservationQuery {
    /// Query for an explicit command with no ignored marker.
    #[must_use]
    pub const fn new(position: Vec2Fixed, radius: Fixed, area_mask: AreaMask) -> Self {
        Self {
            position,
            radius,
            area_mask,
            is_explicit_command: true,
            ignore_marker: None,
        }
    }

    /// Set whether the request comes from an explicit command.
    #[must_use]
    pub const fn explicit(mut self, is_explicit_command: bool) -> Self {
        self.is_explicit_command = is_explicit_command;
        self
    }

    /// Ignore the given marker.
    #[must_use]
    pub const fn ignoring(mut self, marker: MarkerId) -> Self {
        self.ignore_marker = Some(marker);
        self
    }
}
