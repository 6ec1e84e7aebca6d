//! Rank formation.

use crate::error::Result;
use crate::math::{Fixed, Vec2Fixed};

use super::handler::{effective_spacing, max_empty_attempts_property, try_slot};
use super::{
    FormationHandler, FormationType, GenerateRequest, Generated, PropertyLookup, PROP_SPACING,
    PROP_UNITS_PER_ROW, PROP_UNIT_SPACING,
};

/// Places agents in ranks perpendicular to the facing direction.
///
/// The first rank is centered on the target; later ranks step back toward
/// the agents. Slots fill from the middle of the rank outward.
#[derive(Debug, Clone)]
pub struct RowFormation {
    max_empty_attempts: u32,
    fallback: Option<FormationType>,
}

impl RowFormation {
    /// Empty attempts tolerated by default.
    pub const DEFAULT_MAX_EMPTY_ATTEMPTS: u32 = 4;

    /// Handler falling back to [`FormationType::Circle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_empty_attempts: Self::DEFAULT_MAX_EMPTY_ATTEMPTS,
            fallback: Some(FormationType::Circle),
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

impl Default for RowFormation {
    fn default() -> Self {
        Self::new()
    }
}

/// Lateral slot offsets of a rank with `slots` positions, center first.
pub(crate) fn centered_laterals(slots: i32, spacing: Fixed) -> Vec<Fixed> {
    let mut halves: Vec<i32> = (0..slots).map(|i| 2 * i - (slots - 1)).collect();
    halves.sort_by_key(|half| (half.abs(), *half));
    halves
        .into_iter()
        .map(|half| spacing * Fixed::from_num(half) / Fixed::from_num(2))
        .collect()
}

impl FormationHandler for RowFormation {
    fn formation_type(&self) -> FormationType {
        FormationType::Row
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
        let per_row = request.properties.int(PROP_UNITS_PER_ROW, None)?.max(1);

        let offset = request.offset.max(Fixed::ZERO);
        let rank_center = request.target - request.direction.scale(offset);
        let right = request.direction.perpendicular();

        let mut points = Vec::new();
        for lateral in centered_laterals(per_row, spacing) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::AreaMask;
    use crate::error::SpatialError;
    use crate::formation::{
        FormationDefaults, FormationDescriptor, PathingValidity, PlacementAgent, PropertyLookup,
    };

    struct Open;

    impl PathingValidity for Open {
        fn try_get_valid_position(&self, center: Vec2Fixed, _: Fixed, _: AreaMask) -> Option<Vec2Fixed> {
            Some(center)
        }
    }

    fn generate(
        descriptor: &FormationDescriptor,
        offset: i32,
        validity: &mut dyn FnMut(Vec2Fixed) -> Result<()>,
    ) -> Result<Generated> {
        let agent = PlacementAgent::new(Vec2Fixed::from_ints(0, -20), Fixed::ONE, AreaMask::ALL);
        let defaults = FormationDefaults::builtin();
        let request = GenerateRequest {
            reference: &agent,
            target: Vec2Fixed::from_ints(10, 10),
            direction: Vec2Fixed::UP,
            amount: 10,
            offset: Fixed::from_num(offset),
            properties: PropertyLookup::new(FormationType::Row, descriptor, &defaults),
            pathing: &Open,
            accepted: &[],
        };
        RowFormation::new().generate_points(&request, validity)
    }

    #[test]
    fn test_laterals_center_out() {
        let two = Fixed::from_num(2);
        let laterals = centered_laterals(3, two);
        assert_eq!(laterals, vec![Fixed::ZERO, -two, two]);

        let even = centered_laterals(2, two);
        assert_eq!(even, vec![-Fixed::ONE, Fixed::ONE]);
    }

    #[test]
    fn test_first_rank_on_target() {
        let descriptor = FormationDescriptor::new(FormationType::Row).with_int(PROP_UNITS_PER_ROW, 3);
        let generated = generate(&descriptor, 0, &mut |_| Ok(())).unwrap();
        assert_eq!(
            generated.points,
            vec![
                Vec2Fixed::from_ints(10, 10),
                Vec2Fixed::from_ints(8, 10),
                Vec2Fixed::from_ints(12, 10),
            ]
        );
        assert_eq!(generated.offset, Fixed::from_num(2));
    }

    #[test]
    fn test_later_rank_steps_back() {
        let descriptor = FormationDescriptor::new(FormationType::Row).with_int(PROP_UNITS_PER_ROW, 1);
        let generated = generate(&descriptor, 4, &mut |_| Ok(())).unwrap();
        assert_eq!(generated.points, vec![Vec2Fixed::from_ints(10, 6)]);
    }

    #[test]
    fn test_unit_spacing_alias() {
        let descriptor = FormationDescriptor::new(FormationType::Row)
            .with_int(PROP_UNITS_PER_ROW, 2)
            .with_float(PROP_UNIT_SPACING, Fixed::from_num(6));
        let generated = generate(&descriptor, 0, &mut |_| Ok(())).unwrap();
        assert_eq!(
            generated.points,
            vec![Vec2Fixed::from_ints(7, 10), Vec2Fixed::from_ints(13, 10)]
        );
    }

    #[test]
    fn test_rejected_slots_skipped() {
        let descriptor = FormationDescriptor::new(FormationType::Row).with_int(PROP_UNITS_PER_ROW, 3);
        let blocked = Vec2Fixed::from_ints(10, 10);
        let generated = generate(&descriptor, 0, &mut |p| {
            if p == blocked {
                Err(SpatialError::TargetNotFound)
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(generated.points.len(), 2);
        assert!(!generated.points.contains(&blocked));
    }
}
