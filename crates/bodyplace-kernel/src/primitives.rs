//! Boundary samples for the primitive feature shapes.
//!
//! All samples are in the feature's own frame: boxes span from the origin
//! corner, cylinders stand on the XY plane along +Z, spheres are centered.

use bodyplace_math::Point3;
use std::f64::consts::PI;

/// Eight corners of a box with one corner at the origin.
pub fn sample_box(length: f64, width: f64, height: f64) -> Vec<Point3> {
    let mut pts = Vec::with_capacity(8);
    for &z in &[0.0, height] {
        for &y in &[0.0, width] {
            for &x in &[0.0, length] {
                pts.push(Point3::new(x, y, z));
            }
        }
    }
    pts
}

/// Points on the bottom and top rims of a cylinder along +Z.
///
/// `segments` points per rim; always at least 4 so the axis-aligned
/// extremes of an unrotated cylinder are hit exactly.
pub fn sample_cylinder(radius: f64, height: f64, segments: u32) -> Vec<Point3> {
    let n = segments.max(4) as usize;
    let mut pts = Vec::with_capacity(2 * n);
    for &z in &[0.0, height] {
        for i in 0..n {
            let theta = 2.0 * PI * i as f64 / n as f64;
            let (s, c) = theta.sin_cos();
            pts.push(Point3::new(radius * c, radius * s, z));
        }
    }
    pts
}

/// Points on latitude rings of a sphere centered at the origin, poles included.
pub fn sample_sphere(radius: f64, segments: u32) -> Vec<Point3> {
    let n = segments.max(4) as usize;
    let rings = n / 2;
    let mut pts = vec![
        Point3::new(0.0, 0.0, radius),
        Point3::new(0.0, 0.0, -radius),
    ];
    for r in 1..rings {
        let phi = PI * r as f64 / rings as f64;
        let (sp, cp) = phi.sin_cos();
        for i in 0..n {
            let theta = 2.0 * PI * i as f64 / n as f64;
            let (st, ct) = theta.sin_cos();
            pts.push(Point3::new(radius * sp * ct, radius * sp * st, radius * cp));
        }
    }
    pts
}
