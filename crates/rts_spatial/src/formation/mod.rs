//! Formation placement.
//!
//! A group move or attack asks the [`FormationPlacementEngine`] for one
//! destination per agent. The engine delegates point generation to a
//! [`FormationHandler`] registered for the requested [`FormationType`] and
//! falls back to the handler's declared alternate formation when the
//! primary one stops producing valid points.
//!
//! Formation parameters travel in a [`FormationDescriptor`]: a formation
//! type plus named numeric properties. Properties left unset on a request
//! resolve to per-type defaults held in [`FormationDefaults`].
//!
//! # Example RON
//!
//! ```ron
//! FormationDefaults(
//!     by_type: {
//!         Row: {
//!             "spacing": Float(12884901888),  // Fixed-point for 3.0
//!             "units_per_row": Int(6),
//!         },
//!     },
//! )
//! ```

mod circle;
mod engine;
mod handler;
mod row;
mod wedge;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result, SpatialError};
use crate::math::{fixed_serde, Fixed};

pub use circle::CircleFormation;
pub use engine::{aggregate_direction, FormationPlacementEngine, Placement, PlacementRequest};
pub use handler::{
    FormationHandler, GenerateRequest, Generated, PathingValidity, PlacementAgent,
};
pub use row::RowFormation;
pub use wedge::WedgeFormation;

/// Property holding the distance between neighboring slots.
pub const PROP_SPACING: &str = "spacing";
/// Older name for [`PROP_SPACING`], consulted when `spacing` is unset.
pub const PROP_UNIT_SPACING: &str = "unit_spacing";
/// Property holding the number of slots per rank of a row formation.
pub const PROP_UNITS_PER_ROW: &str = "units_per_row";
/// Property overriding how many empty attempts a formation tolerates.
pub const PROP_MAX_EMPTY_ATTEMPTS: &str = "max_empty_attempts";

/// Formation type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormationType {
    /// Concentric rings around the target.
    Circle,
    /// Ranks perpendicular to the facing direction.
    Row,
    /// Widening ranks with the apex at the target.
    Wedge,
    /// Formation provided by the embedding game.
    Custom(u32),
}

/// A numeric formation property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Fixed-point value.
    Float(#[serde(with = "fixed_serde")] Fixed),
    /// Integer value.
    Int(i32),
}

impl PropertyValue {
    /// Value as fixed-point.
    #[must_use]
    pub fn as_fixed(self) -> Fixed {
        match self {
            Self::Float(value) => value,
            Self::Int(value) => Fixed::from_num(value),
        }
    }

    /// Value as an integer; floats are floored.
    #[must_use]
    pub fn as_int(self) -> i32 {
        match self {
            Self::Float(value) => value.floor().to_num::<i32>(),
            Self::Int(value) => value,
        }
    }
}

/// Formation type plus explicitly set properties for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationDescriptor {
    /// Requested formation type.
    pub formation: FormationType,
    /// Explicit property values.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl FormationDescriptor {
    /// Descriptor with no explicit properties.
    #[must_use]
    pub fn new(formation: FormationType) -> Self {
        Self {
            formation,
            properties: BTreeMap::new(),
        }
    }

    /// Set a fixed-point property.
    #[must_use]
    pub fn with_float(mut self, name: &str, value: Fixed) -> Self {
        self.properties
            .insert(name.to_string(), PropertyValue::Float(value));
        self
    }

    /// Set an integer property.
    #[must_use]
    pub fn with_int(mut self, name: &str, value: i32) -> Self {
        self.properties
            .insert(name.to_string(), PropertyValue::Int(value));
        self
    }
}

/// Per-type property defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationDefaults {
    /// Defaults keyed by formation type, then property name.
    #[serde(default)]
    pub by_type: BTreeMap<FormationType, BTreeMap<String, PropertyValue>>,
}

impl FormationDefaults {
    /// Defaults for the built-in formations.
    #[must_use]
    pub fn builtin() -> Self {
        let spacing = PropertyValue::Float(Fixed::from_num(2));
        let mut defaults = Self::default();
        defaults.set(FormationType::Circle, PROP_SPACING, spacing);
        defaults.set(FormationType::Circle, PROP_MAX_EMPTY_ATTEMPTS, PropertyValue::Int(4));
        defaults.set(FormationType::Row, PROP_SPACING, spacing);
        defaults.set(FormationType::Row, PROP_UNITS_PER_ROW, PropertyValue::Int(5));
        defaults.set(FormationType::Wedge, PROP_SPACING, spacing);
        defaults
    }

    /// Parse defaults from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed text.
    pub fn from_ron_str(text: &str) -> std::result::Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Register a default value.
    pub fn set(&mut self, formation: FormationType, name: &str, value: PropertyValue) {
        self.by_type
            .entry(formation)
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Registered default, if any.
    #[must_use]
    pub fn get(&self, formation: FormationType, name: &str) -> Option<PropertyValue> {
        self.by_type
            .get(&formation)
            .and_then(|props| props.get(name))
            .copied()
    }

    /// Overlay `other` on top of these defaults.
    pub fn merge(&mut self, other: &Self) {
        for (formation, props) in &other.by_type {
            let entry = self.by_type.entry(*formation).or_default();
            for (name, value) in props {
                entry.insert(name.clone(), *value);
            }
        }
    }
}

/// Resolves property lookups for the formation currently generating.
#[derive(Debug, Clone, Copy)]
pub struct PropertyLookup<'a> {
    formation: FormationType,
    descriptor: &'a FormationDescriptor,
    defaults: &'a FormationDefaults,
}

impl<'a> PropertyLookup<'a> {
    /// Lookup for `formation` over a request's descriptor and the defaults.
    #[must_use]
    pub const fn new(
        formation: FormationType,
        descriptor: &'a FormationDescriptor,
        defaults: &'a FormationDefaults,
    ) -> Self {
        Self {
            formation,
            descriptor,
            defaults,
        }
    }

    /// Resolve a property.
    ///
    /// Order: explicit value, explicit value of `fallback_name`, default for
    /// `name`, default for `fallback_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::UnresolvedFormationProperty`] when nothing
    /// resolves; handlers must only ask for properties their type defines.
    pub fn resolve(&self, name: &str, fallback_name: Option<&str>) -> Result<PropertyValue> {
        self.find(name, fallback_name).ok_or_else(|| {
            tracing::error!(
                formation = ?self.formation,
                property = name,
                "Formation property has no value or default"
            );
            SpatialError::UnresolvedFormationProperty {
                formation: self.formation,
                property: name.to_string(),
            }
        })
    }

    /// Resolve an optional property in the same order as
    /// [`PropertyLookup::resolve`], without logging a miss.
    #[must_use]
    pub fn find(&self, name: &str, fallback_name: Option<&str>) -> Option<PropertyValue> {
        let explicit = |key: &str| self.descriptor.properties.get(key).copied();
        let default = |key: &str| self.defaults.get(self.formation, key);

        explicit(name)
            .or_else(|| fallback_name.and_then(explicit))
            .or_else(|| default(name))
            .or_else(|| fallback_name.and_then(default))
    }

    /// Resolve a fixed-point property.
    ///
    /// # Errors
    ///
    /// See [`PropertyLookup::resolve`].
    pub fn float(&self, name: &str, fallback_name: Option<&str>) -> Result<Fixed> {
        self.resolve(name, fallback_name).map(PropertyValue::as_fixed)
    }

    /// Resolve an integer property.
    ///
    /// # Errors
    ///
    /// See [`PropertyLookup::resolve`].
    pub fn int(&self, name: &str, fallback_name: Option<&str>) -> Result<i32> {
        self.resolve(name, fallback_name).map(PropertyValue::as_int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let mut defaults = FormationDefaults::default();
        defaults.set(FormationType::Row, "a", PropertyValue::Int(1));
        defaults.set(FormationType::Row, "b", PropertyValue::Int(2));

        let descriptor = FormationDescriptor::new(FormationType::Row).with_int("c", 3);
        let lookup = PropertyLookup::new(FormationType::Row, &descriptor, &defaults);

        // Explicit fallback name beats the default for the primary name.
        assert_eq!(lookup.int("a", Some("c")).unwrap(), 3);
        assert_eq!(lookup.int("a", None).unwrap(), 1);
        assert_eq!(lookup.int("missing", Some("b")).unwrap(), 2);
    }

    #[test]
    fn test_explicit_beats_default() {
        let defaults = FormationDefaults::builtin();
        let descriptor =
            FormationDescriptor::new(FormationType::Row).with_float(PROP_SPACING, Fixed::from_num(7));
        let lookup = PropertyLookup::new(FormationType::Row, &descriptor, &defaults);
        assert_eq!(lookup.float(PROP_SPACING, None).unwrap(), Fixed::from_num(7));
        assert_eq!(lookup.int(PROP_UNITS_PER_ROW, None).unwrap(), 5);
    }

    #[test]
    fn test_defaults_follow_current_formation() {
        let defaults = FormationDefaults::builtin();
        let descriptor = FormationDescriptor::new(FormationType::Wedge);
        let lookup = PropertyLookup::new(FormationType::Circle, &descriptor, &defaults);
        assert!(lookup.int(PROP_UNITS_PER_ROW, None).is_err());
    }

    #[test]
    fn test_unresolved_property_error() {
        let defaults = FormationDefaults::default();
        let descriptor = FormationDescriptor::new(FormationType::Custom(4));
        let lookup = PropertyLookup::new(FormationType::Custom(4), &descriptor, &defaults);
        assert_eq!(
            lookup.float("radius", Some("size")),
            Err(SpatialError::UnresolvedFormationProperty {
                formation: FormationType::Custom(4),
                property: "radius".to_string(),
            })
        );
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(PropertyValue::Int(4).as_fixed(), Fixed::from_num(4));
        assert_eq!(PropertyValue::Float(Fixed::from_num(2.75)).as_int(), 2);
    }

    #[test]
    fn test_defaults_from_ron() {
        let text = r#"
            FormationDefaults(
                by_type: {
                    Row: { "units_per_row": Int(8) },
                    Custom(2): { "spacing": Float(12884901888) },
                },
            )
        "#;
        let mut defaults = FormationDefaults::builtin();
        defaults.merge(&FormationDefaults::from_ron_str(text).unwrap());
        assert_eq!(
            defaults.get(FormationType::Row, PROP_UNITS_PER_ROW),
            Some(PropertyValue::Int(8))
        );
        assert_eq!(
            defaults.get(FormationType::Custom(2), PROP_SPACING),
            Some(PropertyValue::Float(Fixed::from_num(3)))
        );
        assert_eq!(
            defaults.get(FormationType::Row, PROP_SPACING),
            Some(PropertyValue::Float(Fixed::from_num(2)))
        );
    }
}
