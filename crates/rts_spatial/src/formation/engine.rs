//! Formation placement engine.

use std::collections::BTreeMap;

use crate::error::{Result, SpatialError};
use crate::math::{Fixed, Vec2Fixed};

use super::{
    CircleFormation, FormationDefaults, FormationDescriptor, FormationHandler, FormationType,
    GenerateRequest, PathingValidity, PlacementAgent, PropertyLookup, RowFormation,
    WedgeFormation,
};

/// Normalized average of the agents' normalized directions toward `target`.
///
/// Falls back to [`Vec2Fixed::UP`] when there are no agents or the
/// directions cancel out.
#[must_use]
pub fn aggregate_direction(agents: &[PlacementAgent], target: Vec2Fixed) -> Vec2Fixed {
    let sum = agents
        .iter()
        .map(|agent| (target - agent.position).normalize())
        .fold(Vec2Fixed::ZERO, |acc, dir| acc + dir);

    let direction = sum.normalize();
    if direction.is_zero() {
        Vec2Fixed::UP
    } else {
        direction
    }
}

/// One group placement request.
#[derive(Debug, Clone, Copy)]
pub struct PlacementRequest<'a> {
    /// Agents to place; the first one is the reference agent.
    pub agents: &'a [PlacementAgent],
    /// Formation center.
    pub target: Vec2Fixed,
    /// Requested formation and properties.
    pub descriptor: &'a FormationDescriptor,
    /// Starting layer offset.
    pub offset: Fixed,
}

impl<'a> PlacementRequest<'a> {
    /// Request starting at offset zero.
    #[must_use]
    pub const fn new(
        agents: &'a [PlacementAgent],
        target: Vec2Fixed,
        descriptor: &'a FormationDescriptor,
    ) -> Self {
        Self {
            agents,
            target,
            descriptor,
            offset: Fixed::ZERO,
        }
    }

    /// Start generating at `offset` from the target.
    #[must_use]
    pub const fn with_offset(mut self, offset: Fixed) -> Self {
        self.offset = offset;
        self
    }
}

/// Result of a placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Destination points, in generation order.
    pub points: Vec<Vec2Fixed>,
    /// Number of points requested.
    pub requested: usize,
    /// Formation that produced the last points.
    pub formation: FormationType,
}

impl Placement {
    /// Whether every requested point was placed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.points.len() >= self.requested
    }

    /// Number of requested points that could not be placed.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.requested.saturating_sub(self.points.len())
    }

    /// Error describing the shortfall of a partial placement.
    #[must_use]
    pub fn shortfall(&self) -> Option<SpatialError> {
        (!self.is_complete()).then_some(SpatialError::FormationPlacementFailed {
            formation: self.formation,
            requested: self.requested,
            placed: self.points.len(),
        })
    }
}

/// Computes formation destinations for groups of agents.
pub struct FormationPlacementEngine<P> {
    handlers: BTreeMap<FormationType, Box<dyn FormationHandler>>,
    defaults: FormationDefaults,
    pathing: P,
}

impl<P: PathingValidity> FormationPlacementEngine<P> {
    /// Engine with no handlers registered.
    pub fn new(pathing: P, defaults: FormationDefaults) -> Self {
        Self {
            handlers: BTreeMap::new(),
            defaults,
            pathing,
        }
    }

    /// Engine with the circle, row and wedge handlers and their defaults.
    pub fn with_builtin_handlers(pathing: P) -> Self {
        let mut engine = Self::new(pathing, FormationDefaults::builtin());
        engine.register(Box::new(CircleFormation::new()));
        engine.register(Box::new(RowFormation::new()));
        engine.register(Box::new(WedgeFormation::new()));
        engine
    }

    /// Register a handler, replacing any handler of the same type.
    pub fn register(&mut self, handler: Box<dyn FormationHandler>) {
        let formation = handler.formation_type();
        if self.handlers.insert(formation, handler).is_some() {
            tracing::debug!(?formation, "Replaced formation handler");
        }
    }

    /// Whether a handler is registered for `formation`.
    #[must_use]
    pub fn has_handler(&self, formation: FormationType) -> bool {
        self.handlers.contains_key(&formation)
    }

    /// Property defaults.
    #[must_use]
    pub fn defaults(&self) -> &FormationDefaults {
        &self.defaults
    }

    /// Mutable property defaults.
    pub fn defaults_mut(&mut self) -> &mut FormationDefaults {
        &mut self.defaults
    }

    /// Pathing delegate.
    pub fn pathing(&self) -> &P {
        &self.pathing
    }

    /// Compute up to one destination per agent.
    ///
    /// Handlers generate layers until enough points are found. A handler
    /// that errors or returns too many empty layers hands over to its
    /// fallback formation with the offset reset. Each formation is used at
    /// most once per call, and a fallback without a registered handler is
    /// treated as no fallback.
    ///
    /// A partial result is still `Ok`; see [`Placement::shortfall`].
    ///
    /// # Errors
    ///
    /// - [`SpatialError::UnregisteredFormation`] when the requested formation
    ///   has no handler.
    /// - The handler's own error when it fails and has no usable fallback.
    /// - [`SpatialError::FormationPlacementFailed`] when no point at all
    ///   could be placed.
    pub fn place<F>(&self, request: &PlacementRequest<'_>, mut validity: F) -> Result<Placement>
    where
        F: FnMut(Vec2Fixed) -> Result<()>,
    {
        let requested = request.agents.len();
        let mut formation = request.descriptor.formation;
        let Some(reference) = request.agents.first() else {
            return Ok(Placement {
                points: Vec::new(),
                requested,
                formation,
            });
        };

        let direction = aggregate_direction(request.agents, request.target);
        let mut handler = self.handler(formation)?;
        let mut visited = vec![formation];
        let mut points: Vec<Vec2Fixed> = Vec::with_capacity(requested);
        let mut offset = request.offset;
        let mut empty_attempts = 0_u32;

        while points.len() < requested {
            let properties = PropertyLookup::new(formation, request.descriptor, &self.defaults);
            let attempt = GenerateRequest {
                reference,
                target: request.target,
                direction,
                amount: requested - points.len(),
                offset,
                properties,
                pathing: &self.pathing,
                accepted: &points,
            };

            let failure = match handler.generate_points(&attempt, &mut validity) {
                Ok(generated) => {
                    let take = generated.points.len().min(requested - points.len());
                    points.extend_from_slice(&generated.points[..take]);
                    offset = generated.offset;

                    if take > 0 {
                        continue;
                    }
                    empty_attempts += 1;
                    if empty_attempts < handler.max_empty_attempts(&properties) {
                        continue;
                    }
                    None
                }
                Err(err) => {
                    tracing::warn!(?formation, %err, "Formation handler failed");
                    Some(err)
                }
            };

            let next = handler
                .fallback()
                .filter(|next| !visited.contains(next))
                .and_then(|next| match self.handlers.get(&next) {
                    Some(fallback) => Some((next, &**fallback)),
                    None => {
                        tracing::warn!(
                            from = ?formation,
                            to = ?next,
                            "Fallback formation has no handler"
                        );
                        None
                    }
                });

            let Some((next, fallback)) = next else {
                if let Some(err) = failure {
                    return Err(err);
                }
                break;
            };

            tracing::debug!(
                from = ?formation,
                to = ?next,
                placed = points.len(),
                "Switching to fallback formation"
            );
            handler = fallback;
            formation = next;
            visited.push(next);
            offset = request.offset;
            empty_attempts = 0;
        }

        if points.is_empty() {
            tracing::warn!(?formation, requested, "No formation point could be placed");
            return Err(SpatialError::FormationPlacementFailed {
                formation,
                requested,
                placed: 0,
            });
        }

        if points.len() < requested {
            tracing::debug!(
                ?formation,
                requested,
                placed = points.len(),
                "Partial formation placement"
            );
        }

        Ok(Placement {
            points,
            requested,
            formation,
        })
    }

    fn handler(&self, formation: FormationType) -> Result<&dyn FormationHandler> {
        self.handlers
            .get(&formation)
            .map(|handler| &**handler)
            .ok_or(SpatialError::UnregisteredFormation(formation))
    }
}
