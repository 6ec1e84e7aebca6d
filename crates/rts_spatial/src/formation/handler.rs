//! Formation handler interface and shared slot placement.

use crate::components::AreaMask;
use crate::error::Result;
use crate::math::{Fixed, Vec2Fixed};

use super::{FormationType, PropertyLookup, PROP_MAX_EMPTY_ATTEMPTS};

/// Terrain query provided by the pathfinding layer.
pub trait PathingValidity {
    /// Nearest walkable position to `center` for an agent of `radius` on
    /// `area_mask`, or `None` if no such position exists nearby.
    fn try_get_valid_position(
        &self,
        center: Vec2Fixed,
        radius: Fixed,
        area_mask: AreaMask,
    ) -> Option<Vec2Fixed>;
}

impl<T: PathingValidity + ?Sized> PathingValidity for &T {
    fn try_get_valid_position(
        &self,
        center: Vec2Fixed,
        radius: Fixed,
        area_mask: AreaMask,
    ) -> Option<Vec2Fixed> {
        (**self).try_get_valid_position(center, radius, area_mask)
    }
}

/// Agent taking part in a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementAgent {
    /// Current position.
    pub position: Vec2Fixed,
    /// Agent radius.
    pub radius: Fixed,
    /// Area types the agent moves on.
    pub area_mask: AreaMask,
}

impl PlacementAgent {
    /// Create an agent.
    #[must_use]
    pub const fn new(position: Vec2Fixed, radius: Fixed, area_mask: AreaMask) -> Self {
        Self {
            position,
            radius,
            area_mask,
        }
    }
}

/// Inputs for one generation attempt.
pub struct GenerateRequest<'a> {
    /// Agent whose radius and area mask are used for every slot.
    pub reference: &'a PlacementAgent,
    /// Formation center.
    pub target: Vec2Fixed,
    /// Unit facing, from the agents toward the target.
    pub direction: Vec2Fixed,
    /// Points still needed.
    pub amount: usize,
    /// Distance from the target of the layer to generate.
    pub offset: Fixed,
    /// Property resolution for the current formation.
    pub properties: PropertyLookup<'a>,
    /// Terrain snapping.
    pub pathing: &'a dyn PathingValidity,
    /// Points accepted by earlier attempts of this placement.
    pub accepted: &'a [Vec2Fixed],
}

/// Output of one generation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    /// Valid points produced by this attempt, at most `amount`.
    pub points: Vec<Vec2Fixed>,
    /// Offset for the next attempt.
    pub offset: Fixed,
}

/// A pluggable formation layout.
pub trait FormationHandler {
    /// Type this handler serves.
    fn formation_type(&self) -> FormationType;

    /// Empty attempts tolerated before falling back.
    ///
    /// The count covers every attempt this formation makes during one
    /// placement; productive attempts in between do not reset it. A limit
    /// of zero falls back on the first empty attempt.
    fn max_empty_attempts(&self, properties: &PropertyLookup<'_>) -> u32;

    /// Formation to switch to once this one gives up.
    fn fallback(&self) -> Option<FormationType>;

    /// Generate the next layer of valid points.
    ///
    /// `validity` is called for every candidate after terrain snapping and
    /// returns `Ok` when the point may be used.
    ///
    /// # Errors
    ///
    /// Returns an error when the handler cannot produce layers at all, for
    /// example when a required property does not resolve.
    fn generate_points(
        &self,
        request: &GenerateRequest<'_>,
        validity: &mut dyn FnMut(Vec2Fixed) -> Result<()>,
    ) -> Result<Generated>;
}

/// Snap `raw` to walkable terrain and keep it if it passes `validity` and
/// stays clear of every point already taken.
pub(crate) fn try_slot(
    raw: Vec2Fixed,
    request: &GenerateRequest<'_>,
    validity: &mut dyn FnMut(Vec2Fixed) -> Result<()>,
    out: &mut Vec<Vec2Fixed>,
) -> bool {
    let agent = request.reference;
    let Some(point) = request
        .pathing
        .try_get_valid_position(raw, agent.radius, agent.area_mask)
    else {
        return false;
    };

    // Slack of 1/16 absorbs rounding on slots exactly one spacing apart.
    let diameter = agent.radius + agent.radius;
    let min_sq = diameter * diameter;
    let min_sq = min_sq - min_sq / 16;
    let crowded = request
        .accepted
        .iter()
        .chain(out.iter())
        .any(|&other| other == point || other.distance_squared(point) < min_sq);
    if crowded {
        return false;
    }

    if let Err(err) = validity(point) {
        tracing::trace!(?point, %err, "Formation slot rejected");
        return false;
    }

    out.push(point);
    true
}

/// The `max_empty_attempts` property if set, else `configured`.
/// Negative values count as zero.
pub(crate) fn max_empty_attempts_property(
    properties: &PropertyLookup<'_>,
    configured: u32,
) -> u32 {
    properties
        .find(PROP_MAX_EMPTY_ATTEMPTS, None)
        .map_or(configured, |value| u32::try_from(value.as_int()).unwrap_or(0))
}

/// Spacing clamped so neighboring slots never overlap and layers advance.
pub(crate) fn effective_spacing(spacing: Fixed, agent: &PlacementAgent) -> Fixed {
    spacing.max(agent.radius + agent.radius).max(Fixed::ONE)
}
