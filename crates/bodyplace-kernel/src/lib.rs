#![warn(missing_docs)]

//! Geometry kernel boundary for bodyplace.
//!
//! The migration core never looks inside a shape. It needs exactly two
//! things from a kernel: evaluate one feature at a resolved world placement
//! ([`GeometryKernel::evaluate_feature`]) and measure the result
//! ([`BoundedShape::bounding_box`]). Any B-rep kernel can sit behind these
//! traits.
//!
//! [`SampledKernel`] is the reference implementation used by the CLI and
//! the tests: shapes are clouds of boundary samples, which is enough to
//! compare world-space bounding boxes before and after a migration.
//!
//! # Example
//!
//! ```
//! use bodyplace_ir::FeatureOp;
//! use bodyplace_kernel::{BoundedShape, GeometryKernel, SampledKernel};
//! use bodyplace_math::Placement;
//!
//! let kernel = SampledKernel::default();
//! let op = FeatureOp::AdditiveBox { length: 20.0, width: 12.0, height: 8.0 };
//! let shape = kernel
//!     .evaluate_feature(&op, &Placement::from_translation(1.0, 0.0, 0.0), &[])
//!     .unwrap();
//! assert_eq!(shape.bounding_box().max.x, 21.0);
//! ```

pub mod primitives;

use bodyplace_ir::FeatureOp;
use bodyplace_math::{Aabb3, Placement, Point3};
use thiserror::Error;

/// Errors a kernel reports when it rejects a feature.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// A dimension is zero, negative or not finite.
    #[error("invalid {parameter}: {value}")]
    InvalidParameter {
        /// Parameter name.
        parameter: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A subtractive feature has nothing to cut from.
    #[error("{op} needs a base shape")]
    MissingBase {
        /// Operation kind.
        op: &'static str,
    },
    /// The kernel produced no geometry.
    #[error("resulting shape is empty")]
    EmptyShape,
    /// Kernel-specific failure, passed through verbatim.
    #[error("{0}")]
    Other(String),
}

/// A shape the migration can measure and move.
pub trait BoundedShape: Clone {
    /// World-space axis-aligned bounds.
    fn bounding_box(&self) -> Aabb3;

    /// The same shape with `placement` applied on top.
    fn transformed(&self, placement: &Placement) -> Self;
}

/// The geometry kernel as seen from the migration core.
pub trait GeometryKernel {
    /// Shape type produced by this kernel.
    type Shape: BoundedShape;

    /// Evaluate one feature.
    ///
    /// `placement` is the feature's resolved world placement, `inputs` the
    /// already-evaluated shapes of its predecessors, in order.
    fn evaluate_feature(
        &self,
        op: &FeatureOp,
        placement: &Placement,
        inputs: &[&Self::Shape],
    ) -> Result<Self::Shape, KernelError>;
}

/// A shape represented by sampled boundary points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledShape {
    points: Vec<Point3>,
}

impl SampledShape {
    /// Create a shape from its samples.
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// A shape with no samples.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sample points.
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// True when there are no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Union with another shape (samples are concatenated).
    pub fn union(&self, other: &SampledShape) -> SampledShape {
        let mut points = self.points.clone();
        points.extend_from_slice(&other.points);
        SampledShape { points }
    }
}

impl BoundedShape for SampledShape {
    fn bounding_box(&self) -> Aabb3 {
        Aabb3::from_points(&self.points)
    }

    fn transformed(&self, placement: &Placement) -> Self {
        Self {
            points: self.points.iter().map(|p| placement.apply_point(p)).collect(),
        }
    }
}

/// Reference kernel over [`SampledShape`].
///
/// Additive features union their primitive with the inputs. Subtractive
/// features keep their base unchanged, so their bounds are conservative.
/// Datum planes pass the inputs through.
#[derive(Debug, Clone, Copy)]
pub struct SampledKernel {
    /// Samples per circular rim.
    pub segments: u32,
}

impl SampledKernel {
    /// Kernel with the given circular resolution.
    pub fn new(segments: u32) -> Self {
        Self { segments }
    }
}

impl Default for SampledKernel {
    fn default() -> Self {
        Self { segments: 32 }
    }
}

fn positive(parameter: &'static str, value: f64) -> Result<f64, KernelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(KernelError::InvalidParameter { parameter, value })
    }
}

fn union_all(inputs: &[&SampledShape]) -> SampledShape {
    inputs
        .iter()
        .fold(SampledShape::empty(), |acc, s| acc.union(s))
}

impl GeometryKernel for SampledKernel {
    type Shape = SampledShape;

    fn evaluate_feature(
        &self,
        op: &FeatureOp,
        placement: &Placement,
        inputs: &[&SampledShape],
    ) -> Result<SampledShape, KernelError> {
        let base = union_all(inputs);
        match op {
            FeatureOp::AdditiveBox {
                length,
                width,
                height,
            } => {
                let local = primitives::sample_box(
                    positive("length", *length)?,
                    positive("width", *width)?,
                    positive("height", *height)?,
                );
                Ok(base.union(&SampledShape::new(local).transformed(placement)))
            }
            FeatureOp::AdditiveCylinder { radius, height } => {
                let local = primitives::sample_cylinder(
                    positive("radius", *radius)?,
                    positive("height", *height)?,
                    self.segments,
                );
                Ok(base.union(&SampledShape::new(local).transformed(placement)))
            }
            FeatureOp::AdditiveSphere { radius } => {
                let local = primitives::sample_sphere(positive("radius", *radius)?, self.segments);
                Ok(base.union(&SampledShape::new(local).transformed(placement)))
            }
            FeatureOp::SubtractiveBox {
                length,
                width,
                height,
            } => {
                positive("length", *length)?;
                positive("width", *width)?;
                positive("height", *height)?;
                if base.is_empty() {
                    return Err(KernelError::MissingBase { op: op.kind() });
                }
                Ok(base)
            }
            FeatureOp::SubtractiveCylinder { radius, height } => {
                positive("radius", *radius)?;
                positive("height", *height)?;
                if base.is_empty() {
                    return Err(KernelError::MissingBase { op: op.kind() });
                }
                Ok(base)
            }
            FeatureOp::DatumPlane => Ok(base),
        }
    }
}
