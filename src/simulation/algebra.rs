//! Geometric primitives used by the physics core
//!
//! Points are `nalgebra` points, displacements are [`Translator`]s and
//! walls are [`Plane`]s. A translator is a pure translation motor: composing
//! two of them (`*`) adds their displacements, so the group product and the
//! accumulator sum (`+`) coincide. Both spellings are kept because forces are
//! composed (spring restoring term with its damping term) while accumulators
//! are summed.

use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub};

use nalgebra::{Point3, Vector3};

pub type NVec3 = Vector3<f64>;
pub type NPoint3 = Point3<f64>;

/// Rigid displacement with a scalar magnitude ("charge")
///
/// Used for velocities, forces and impulses alike
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Translator {
    pub displacement: NVec3,
}

impl Translator {
    /// The neutral element, no displacement
    pub fn identity() -> Self {
        Self {
            displacement: NVec3::zeros(),
        }
    }

    /// Translator of length `charge` along direction `(x, y, z)`
    ///
    /// The direction does not need to be normalized. A zero direction gives
    /// the identity.
    pub fn new(charge: f64, x: f64, y: f64, z: f64) -> Self {
        let direction = NVec3::new(x, y, z);
        let len = direction.norm();
        if len == 0.0 {
            return Self::identity();
        }
        Self {
            displacement: direction * (charge / len),
        }
    }

    pub fn from_vector(displacement: NVec3) -> Self {
        Self { displacement }
    }

    /// Magnitude of the displacement
    pub fn charge(&self) -> f64 {
        self.displacement.norm()
    }

    pub fn is_identity(&self) -> bool {
        self.displacement == NVec3::zeros()
    }

    /// Move `point` by this translator
    pub fn apply(&self, point: &NPoint3) -> NPoint3 {
        point + self.displacement
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::identity()
    }
}

/// Group composition
impl Mul for Translator {
    type Output = Translator;

    fn mul(self, rhs: Translator) -> Translator {
        Translator::from_vector(self.displacement + rhs.displacement)
    }
}

impl MulAssign for Translator {
    fn mul_assign(&mut self, rhs: Translator) {
        self.displacement += rhs.displacement;
    }
}

impl Mul<f64> for Translator {
    type Output = Translator;

    fn mul(self, rhs: f64) -> Translator {
        Translator::from_vector(self.displacement * rhs)
    }
}

impl Div<f64> for Translator {
    type Output = Translator;

    fn div(self, rhs: f64) -> Translator {
        Translator::from_vector(self.displacement / rhs)
    }
}

impl Neg for Translator {
    type Output = Translator;

    fn neg(self) -> Translator {
        Translator::from_vector(-self.displacement)
    }
}

impl Add for Translator {
    type Output = Translator;

    fn add(self, rhs: Translator) -> Translator {
        Translator::from_vector(self.displacement + rhs.displacement)
    }
}

impl AddAssign for Translator {
    fn add_assign(&mut self, rhs: Translator) {
        self.displacement += rhs.displacement;
    }
}

impl Sub for Translator {
    type Output = Translator;

    fn sub(self, rhs: Translator) -> Translator {
        Translator::from_vector(self.displacement - rhs.displacement)
    }
}

/// Oriented plane `a*x + b*y + c*z + d = 0`
///
/// Coefficients are normalized on construction so that
/// [`Plane::signed_distance`] is metric. Points on the normal side are
/// "outside" (positive distance).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: NVec3,
    pub d: f64,
}

impl Plane {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        let normal = NVec3::new(a, b, c);
        let len = normal.norm();
        if len == 0.0 {
            return Self { normal, d };
        }
        Self {
            normal: normal / len,
            d: d / len,
        }
    }

    /// Raw `[a, b, c, d]` coefficients (normalized)
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.d]
    }

    /// Scalar part of the point/plane product: signed distance to the plane
    pub fn signed_distance(&self, point: &NPoint3) -> f64 {
        self.normal.dot(&point.coords) + self.d
    }

    /// Closest point of the plane to the origin, used when drawing it
    pub fn anchor(&self) -> NPoint3 {
        NPoint3::from(self.normal * -self.d)
    }
}

/// Distance between two points (norm of their join)
pub fn join_norm(p: &NPoint3, q: &NPoint3) -> f64 {
    (p - q).norm()
}

/// Position of `value` between `a` and `b`, clamped to [0, 1]
///
/// Returns 0 when `a == b`.
pub fn inverse_lerp(a: f64, b: f64, value: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    if value <= a {
        return 0.0;
    }
    if value >= b {
        return 1.0;
    }
    (value - a) / (b - a)
}

/// Cubic Hermite step `3t² - 2t³` of `x` between `edge0` and `edge1`
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    if edge0 == edge1 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
