//! Concentric ring formation.

use crate::error::Result;
use crate::math::{fixed_sin_cos, Fixed, Vec2Fixed};

use super::handler::{effective_spacing, max_empty_attempts_property, try_slot};
use super::{
    FormationHandler, FormationType, GenerateRequest, Generated, PropertyLookup, PROP_SPACING,
    PROP_UNIT_SPACING,
};

/// Places agents on rings around the target, one ring per attempt.
///
/// Offset zero is the target itself. Each ring holds as many slots as fit
/// around its circumference at the configured spacing, starting on the
/// side facing the agents.
#[derive(Debug, Clone)]
pub struct CircleFormation {
    max_empty_attempts: u32,
}

impl CircleFormation {
    /// Empty attempts tolerated by default.
    pub const DEFAULT_MAX_EMPTY_ATTEMPTS: u32 = 4;

    /// Handler with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_empty_attempts: Self::DEFAULT_MAX_EMPTY_ATTEMPTS,
        }
    }

    /// Override the number of tolerated empty attempts.
    #[must_use]
    pub const fn with_max_empty_attempts(mut self, attempts: u32) -> Self {
        self.max_empty_attempts = attempts;
        self
    }
}

impl Default for CircleFormation {
    fn default() -> Self {
        Self::new()
    }
}

impl FormationHandler for CircleFormation {
    fn formation_type(&self) -> FormationType {
        FormationType::Circle
    }

    fn max_empty_attempts(&self, properties: &PropertyLookup<'_>) -> u32 {
        max_empty_attempts_property(properties, self.max_empty_attempts)
    }

    fn fallback(&self) -> Option<FormationType> {
        None
    }

    fn generate_points(
        &self,
        request: &GenerateRequest<'_>,
        validity: &mut dyn FnMut(Vec2Fixed) -> Result<()>,
    ) -> Result<Generated> {
        let spacing = request
            .properties
            .float(PROP_SPACING, Some(PROP_UNIT_SPACING))?;
        let spacing = effective_spacing(spacing, request.reference);
        let radius = request.offset.max(Fixed::ZERO);

        let mut points = Vec::new();
        if radius == Fixed::ZERO {
            try_slot(request.target, request, validity, &mut points);
        } else {
            let slots = ring_slots(radius, spacing);
            let step = Fixed::TAU / Fixed::from_num(slots);
            let start = (-request.direction).scale(radius);

            for slot in 0..slots {
                if points.len() >= request.amount {
                    break;
                }
                let around = start.rotate(step * Fixed::from_num(slot));
                try_slot(request.target + around, request, validity, &mut points);
            }
        }

        Ok(Generated {
            points,
            offset: radius + spacing,
        })
    }
}

/// Largest slot count whose chord between neighbors is at least `spacing`.
fn ring_slots(radius: Fixed, spacing: Fixed) -> i64 {
    let mut slots = (Fixed::TAU * radius / spacing).floor().to_num::<i64>();
    while slots > 1 {
        let (sin, _) = fixed_sin_cos(Fixed::PI / Fixed::from_num(slots));
        if radius * sin * Fixed::from_num(2) >= spacing {
            break;
        }
        slots -= 1;
    }
    slots.max(1)
}
