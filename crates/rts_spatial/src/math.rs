//! Fixed-point math utilities for deterministic spatial queries.
//!
//! Every distance test, cell assignment and formation slot is computed
//! with fixed-point arithmetic so that independent replicas of the
//! simulation produce bit-identical results. Floating-point operations
//! can produce different results on different CPUs.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector pointing along +Y, the default facing of a formation.
    pub const UP: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ONE,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates at [`Fixed::MAX`] for points more than about 46 340 units
    /// apart instead of overflowing.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Dot product of two vectors, saturating on overflow.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Scale both components by `factor`.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Vector rotated 90 degrees clockwise (the "right" side of a facing).
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(self.y, -self.x)
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    fn max_abs_component(self) -> Fixed {
        self.x.saturating_abs().max(self.y.saturating_abs())
    }

    /// Whether both components are zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == Fixed::ZERO && self.y == Fixed::ZERO
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let largest = self.max_abs_component();
        if largest == Fixed::ZERO {
            return Self::ZERO;
        }

        // Long vectors are shrunk into the unit square first; their squared
        // length would not fit in `Fixed`.
        let scaled = if largest > Fixed::ONE {
            Self::new(self.x / largest, self.y / largest)
        } else {
            self
        };

        let len = scaled.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(scaled.x / len, scaled.y / len)
    }

    /// Rotate the vector counter-clockwise by `angle` radians.
    #[must_use]
    pub fn rotate(self, angle: Fixed) -> Self {
        let (sin, cos) = fixed_sin_cos(angle);
        Self::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
        )
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    // `high` is never returned, so start one past the largest candidate.
    let mut high = value.max(Fixed::ONE).saturating_add(Fixed::ONE);

    // 64 halvings exhaust the 64-bit representation for the full range.
    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        if mid == low {
            break;
        }
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Sine and cosine of `angle` (radians) using a fixed-point Taylor series.
///
/// The angle is reduced to `[-π/2, π/2]` before evaluation, which keeps the
/// truncated series accurate to well below `1e-6`.
#[must_use]
pub fn fixed_sin_cos(angle: Fixed) -> (Fixed, Fixed) {
    let sin = fixed_sin(angle);
    let cos = fixed_sin(angle + Fixed::FRAC_PI_2);
    (sin, cos)
}

fn fixed_sin(angle: Fixed) -> Fixed {
    // Reduce to [-π, π).
    let mut a = (angle + Fixed::PI).rem_euclid(Fixed::TAU) - Fixed::PI;

    // Fold into [-π/2, π/2] using sin(x) = sin(π - x).
    if a > Fixed::FRAC_PI_2 {
        a = Fixed::PI - a;
    } else if a < -Fixed::FRAC_PI_2 {
        a = -Fixed::PI - a;
    }

    let a2 = a * a;
    let mut term = a;
    let mut sum = a;
    // x - x³/3! + x⁵/5! - ... up to x¹³/13!
    for n in 1..=6_i32 {
        let denom = Fixed::from_num((2 * n) * (2 * n + 1));
        term = -(term * a2) / denom;
        sum += term;
    }
    sum
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}
