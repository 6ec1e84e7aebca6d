//! Wedge formation.

use crate::error::Result;
use crate::math::{Fixed, Vec2Fixed};

use super::handler::{effective_spacing, max_empty_attempts_property, try_slot};
use super::row::centered_laterals;
use super::{
    FormationHandler, FormationType, GenerateRequest, Generated, PropertyLookup, PROP_SPACING,
    PROP_UNIT_SPACING,
};

/// Places agents in a wedge with its apex on the target.
///
/// Rank `k` behind the apex holds `k + 1` slots. Falls back to
/// [`FormationType::Row`] by default.
#[derive(Debug, Clone)]
pub struct WedgeFormation {
    max_empty_attempts: u32,
    fallback: Option<FormationType>,
}

impl WedgeFormation {
    /// Empty attempts tolerated by default.
    pub const DEFAULT_MAX_EMPTY_ATTEMPTS: u32 = 3;

    /// Handler with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_empty_attempts: Self::DEFAULT_MAX_EMPTY_ATTEMPTS,
            fallback: Some(FormationType::Row),
        }
    }

    /// Override the number of tolerated empty attempts.
    #[must_use]
    pub const fn with_max_empty_attempts(mut self, attempts: u32) -> Self {
        self.max_empty_attempts = attempts;
        self
    }

    /// Override the fallback formation.
    #[must_use]
    pub const fn with_fallback(mut self, fallback: Option<FormationType>) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for WedgeFormation {
    fn default() -> Self {
        Self::new()
    }
}

impl FormationHandler for WedgeFormation {
    fn formation_type(&self) -> FormationType {
        FormationType::Wedge
    }

    fn max_empty_attempts(&self, properties: &PropertyLookup<'_>) -> u32 {
        max_empty_attempts_property(properties, self.max_empty_attempts)
    }

    fn fallback(&self) -> Option<FormationType> {
        self.fallback
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

        let offset = request.offset.max(Fixed::ZERO);
        let rank = (offset / spacing).round().to_num::<i32>();
        let rank_center = request.target - request.direction.scale(offset);
        let right = request.direction.perpendicular();

        let mut points = Vec::new();
        for lateral in centered_laterals(rank + 1, spacing) {
            if points.len() >= request.amount {
                break;
            }
            try_slot(rank_center + right.scale(lateral), request, validity, &mut points);
        }

        Ok(Generated {
            points,
            offset: offset + spacing,
        })
    }
}
