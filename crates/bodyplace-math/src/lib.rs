#![warn(missing_docs)]

//! Math types for bodyplace.
//!
//! Thin wrappers around nalgebra providing the rigid [`Placement`] used for
//! body, feature and binder frames, the [`Tolerance`] constants shared with
//! the geometry kernel, and the [`Aabb3`] bounding box used to validate a
//! migration.
//!
//! Composition reads right to left: a point in the innermost frame maps to
//! world through `outer ∘ … ∘ inner`, i.e. `compose(outer, inner)`.

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A unit quaternion rotation.
pub type Rotation = UnitQuaternion<f64>;

/// A rigid transform: rotation followed by translation.
///
/// Scaling and shearing are not representable, so [`Placement::inverse`]
/// always exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    iso: Isometry3<f64>,
}

impl Placement {
    /// Identity placement.
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    /// Placement from a translation vector and a rotation.
    pub fn new(translation: Vec3, rotation: Rotation) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Pure translation by `(dx, dy, dz)`.
    pub fn from_translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(Vec3::new(dx, dy, dz), Rotation::identity())
    }

    /// Rotation about an axis through the origin by `angle` radians.
    ///
    /// A zero-length axis yields the identity rotation.
    pub fn from_axis_angle(axis: &Vec3, angle: f64) -> Self {
        let rotation = Dir3::try_new(*axis, f64::EPSILON)
            .map(|dir| Rotation::from_axis_angle(&dir, angle))
            .unwrap_or_else(Rotation::identity);
        Self::new(Vec3::zeros(), rotation)
    }

    /// Rotation about an axis through the origin by `degrees`.
    pub fn from_axis_angle_deg(axis: &Vec3, degrees: f64) -> Self {
        Self::from_axis_angle(axis, degrees.to_radians())
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        Self::from_axis_angle(&Vec3::x(), angle)
    }

    /// Rotation about the Y axis by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        Self::from_axis_angle(&Vec3::y(), angle)
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        Self::from_axis_angle(&Vec3::z(), angle)
    }

    /// Translation part.
    pub fn translation(&self) -> Vec3 {
        self.iso.translation.vector
    }

    /// Rotation part.
    pub fn rotation(&self) -> Rotation {
        self.iso.rotation
    }

    /// Rotation angle in radians, in `[0, π]`.
    ///
    /// Computed from the imaginary part so that tiny angles do not collapse
    /// to zero through `acos`.
    pub fn rotation_angle(&self) -> f64 {
        let q = self.iso.rotation.quaternion();
        2.0 * q.imag().norm().atan2(q.scalar().abs())
    }

    /// Compose: `self ∘ inner` (apply `inner` first, then `self`).
    ///
    /// Same as [`compose`]`(self, inner)`.
    pub fn then(&self, inner: &Placement) -> Self {
        Self {
            iso: self.iso * inner.iso,
        }
    }

    /// Inverse placement: `p.inverse().then(&p)` is the identity.
    pub fn inverse(&self) -> Self {
        Self {
            iso: self.iso.inverse(),
        }
    }

    /// Whether this placement is the identity within tolerance.
    pub fn is_identity(&self, tol: &Tolerance) -> bool {
        tol.is_zero(self.translation().norm()) && self.rotation_angle() < tol.angular
    }

    /// Whether two placements are equal within tolerance.
    pub fn approx_eq(&self, other: &Placement, tol: &Tolerance) -> bool {
        self.inverse().then(other).is_identity(tol)
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        self.iso.transform_point(p)
    }

}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

/// Compose two placements: `outer ∘ inner`.
///
/// A point expressed in the `inner` frame is first mapped by `inner`, then
/// by `outer`. This is the only composition primitive used by the engine.
pub fn compose(outer: &Placement, inner: &Placement) -> Placement {
    outer.then(inner)
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Linear distance tolerance in mm.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Default kernel tolerances (1e-6 mm linear, 1e-9 rad angular).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
    };

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest AABB containing every point.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.include_point(p);
        }
        aabb
    }

    /// True if no point has been included yet.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Largest absolute difference between corresponding bounds.
    ///
    /// Two empty boxes deviate by zero; an empty and a non-empty box by
    /// infinity.
    pub fn max_deviation(&self, other: &Aabb3) -> f64 {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => 0.0,
            (true, false) | (false, true) => f64::INFINITY,
            (false, false) => {
                let dmin = (self.min - other.min).abs().max();
                let dmax = (self.max - other.max).abs().max();
                dmin.max(dmax)
            }
        }
    }

    /// Whether both boxes agree within `tol` on every bound.
    pub fn approx_eq(&self, other: &Aabb3, tol: f64) -> bool {
        self.max_deviation(other) <= tol
    }
}
