//! Conversions between persisted transforms and [`Placement`].

use bodyplace_ir::{Quat, Transform3D, Vec3 as IrVec3};
use bodyplace_math::{Placement, Rotation, Vec3};
use nalgebra::Quaternion;

/// Smallest quaternion norm accepted as a rotation.
const MIN_QUAT_NORM: f64 = 1e-12;

/// Load a persisted transform. `None` when the quaternion has no usable norm
/// or a component is not finite.
pub fn placement_from_ir(t: &Transform3D) -> Option<Placement> {
    let tr = t.translation;
    let q = t.rotation;
    let finite = [tr.x, tr.y, tr.z, q.x, q.y, q.z, q.w]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return None;
    }
    let rotation = Rotation::try_new(Quaternion::new(q.w, q.x, q.y, q.z), MIN_QUAT_NORM)?;
    Some(Placement::new(Vec3::new(tr.x, tr.y, tr.z), rotation))
}

/// Persisted form of a placement.
pub fn placement_to_ir(p: &Placement) -> Transform3D {
    let t = p.translation();
    let r = p.rotation();
    let q = r.quaternion();
    Transform3D::new(
        IrVec3::new(t.x, t.y, t.z),
        Quat {
            x: q.i,
            y: q.j,
            z: q.k,
            w: q.w,
        },
    )
}
