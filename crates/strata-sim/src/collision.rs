//! Swept segment tests against sphere bounds.

use glam::Vec3;

/// First contact of a segment with a sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Fraction along the segment in `[0, 1]`.
    pub t: f32,
    pub point: Vec3,
    /// Outward sphere normal at the contact point.
    pub normal: Vec3,
}

/// Intersect the segment `start..end` with a sphere.
///
/// A segment that starts inside the sphere hits at `t = 0`. Returns `None`
/// when the segment misses or the sphere lies wholly beyond `end`.
pub fn segment_sphere(start: Vec3, end: Vec3, center: Vec3, radius: f32) -> Option<SegmentHit> {
    if radius <= 0.0 || !radius.is_finite() {
        return None;
    }
    let d = end - start;
    let f = start - center;
    let c = f.length_squared() - radius * radius;

    if c <= 0.0 {
        let normal = f
            .try_normalize()
            .or_else(|| (-d).try_normalize())
            .unwrap_or(Vec3::Y);
        return Some(SegmentHit {
            t: 0.0,
            point: start,
            normal,
        });
    }

    let a = d.length_squared();
    if a <= f32::EPSILON {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / (2.0 * a);
    if !(0.0..=1.0).contains(&t) {
        return None;
    }
    let point = start + d * t;
    let normal = (point - center).try_normalize().unwrap_or(Vec3::Y);
    Some(SegmentHit { t, point, normal })
}
