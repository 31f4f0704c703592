//! Voxel raycasting using the DDA (Amanatides & Woo) algorithm.
//!
//! Steps through the integer voxel grid from a world-space origin and
//! returns the first solid voxel along with the entry face normal.

use glam::{IVec3, Vec3};

use crate::chunk::EMPTY;
use crate::store::ChunkStore;

/// Result of a successful voxel raycast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelHit {
    /// Integer coordinate of the voxel that was hit.
    pub voxel: IVec3,
    /// Normal of the entry face. Zero when the origin is inside the voxel.
    pub normal: IVec3,
    /// Distance from the origin to the entry point.
    pub distance: f32,
    /// World-space entry point.
    pub point: Vec3,
    /// Voxel value at the hit.
    pub value: u8,
}

/// Casts a ray through the voxel grid.
///
/// Returns the first non-empty voxel within `max_distance`, or `None` if the
/// ray leaves the range without hitting anything. A zero or non-finite
/// direction never hits.
pub fn raycast(
    store: &ChunkStore,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<VoxelHit> {
    if !origin.is_finite() || !max_distance.is_finite() || max_distance < 0.0 {
        return None;
    }
    let dir = direction.try_normalize()?;

    let mut voxel = origin.floor().as_ivec3();
    let sub_offset = origin - origin.floor();

    // Step direction per axis: +1 or -1.
    let step = IVec3::new(
        if dir.x >= 0.0 { 1 } else { -1 },
        if dir.y >= 0.0 { 1 } else { -1 },
        if dir.z >= 0.0 { 1 } else { -1 },
    );

    // Distance in t-units to cross one full voxel on each axis.
    let t_delta = Vec3::new(
        safe_inv(dir.x.abs()),
        safe_inv(dir.y.abs()),
        safe_inv(dir.z.abs()),
    );

    // Distance in t-units to the first voxel boundary on each axis.
    let mut t_max = Vec3::new(
        initial_t_max(sub_offset.x, dir.x, t_delta.x),
        initial_t_max(sub_offset.y, dir.y, t_delta.y),
        initial_t_max(sub_offset.z, dir.z, t_delta.z),
    );

    let mut normal = IVec3::ZERO;
    let mut t = 0.0_f32;

    loop {
        let value = store.voxel(voxel);
        if value != EMPTY {
            return Some(VoxelHit {
                voxel,
                normal,
                distance: t,
                point: origin + dir * t,
                value,
            });
        }

        // Advance along the axis with the smallest t_max.
        if t_max.x < t_max.y && t_max.x < t_max.z {
            t = t_max.x;
            t_max.x += t_delta.x;
            voxel.x += step.x;
            normal = IVec3::new(-step.x, 0, 0);
        } else if t_max.y < t_max.z {
            t = t_max.y;
            t_max.y += t_delta.y;
            voxel.y += step.y;
            normal = IVec3::new(0, -step.y, 0);
        } else {
            t = t_max.z;
            t_max.z += t_delta.z;
            voxel.z += step.z;
            normal = IVec3::new(0, 0, -step.z);
        }

        if t > max_distance {
            return None;
        }
    }
}

/// Safely compute 1.0 / x, clamping to `f32::MAX` when x ≈ 0.
fn safe_inv(x: f32) -> f32 {
    if x.abs() < f32::EPSILON {
        f32::MAX
    } else {
        1.0 / x
    }
}

/// Compute the initial parametric distance to the first voxel boundary.
fn initial_t_max(sub: f32, dir_component: f32, t_delta: f32) -> f32 {
    if dir_component > 0.0 {
        (1.0 - sub) * t_delta
    } else if dir_component < 0.0 {
        sub * t_delta
    } else {
        f32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CHUNK_VOLUME, Chunk, ChunkId};

    /// A store with a solid wall filling the plane z == 10 inside chunk 0.
    fn wall_store() -> ChunkStore {
        let mut voxels = vec![EMPTY; CHUNK_VOLUME];
        for y in 0..32 {
            for x in 0..32 {
                voxels[crate::chunk::linear_index(x, y, 10)] = 2;
            }
        }
        let mut store = ChunkStore::default();
        store.restore(
            ChunkId::new(0, 0, 0),
            Chunk::from_parts(1, voxels.into_boxed_slice()).unwrap(),
        );
        store
    }

    #[test]
    fn test_hits_wall_with_face_normal() {
        let store = wall_store();
        let hit = raycast(&store, Vec3::new(5.5, 5.5, 2.5), Vec3::Z, 20.0).unwrap();
        assert_eq!(hit.voxel, IVec3::new(5, 5, 10));
        assert_eq!(hit.normal, IVec3::new(0, 0, -1));
        assert!((hit.distance - 7.5).abs() < 1e-4);
        assert!((hit.point.z - 10.0).abs() < 1e-4);
        assert_eq!(hit.value, 2);
    }

    #[test]
    fn test_misses_beyond_max_distance() {
        let store = wall_store();
        assert!(raycast(&store, Vec3::new(5.5, 5.5, 2.5), Vec3::Z, 5.0).is_none());
    }

    #[test]
    fn test_parallel_ray_misses() {
        let store = wall_store();
        assert!(raycast(&store, Vec3::new(5.5, 5.5, 2.5), Vec3::X, 20.0).is_none());
    }

    #[test]
    fn test_negative_direction() {
        let store = wall_store();
        let hit = raycast(&store, Vec3::new(5.5, 5.5, 15.5), Vec3::NEG_Z, 20.0).unwrap();
        assert_eq!(hit.voxel, IVec3::new(5, 5, 10));
        assert_eq!(hit.normal, IVec3::new(0, 0, 1));
        assert!((hit.distance - 4.5).abs() < 1e-4);
    }

    #[test]
    fn test_origin_inside_solid() {
        let store = wall_store();
        let hit = raycast(&store, Vec3::new(5.5, 5.5, 10.5), Vec3::Z, 20.0).unwrap();
        assert_eq!(hit.distance, 0.0);
        assert_eq!(hit.normal, IVec3::ZERO);
    }

    #[test]
    fn test_zero_direction_never_hits() {
        let store = wall_store();
        assert!(raycast(&store, Vec3::new(5.5, 5.5, 10.5), Vec3::ZERO, 20.0).is_none());
    }

    #[test]
    fn test_crosses_into_negative_chunks() {
        let mut store = ChunkStore::default();
        store
            .apply_terraform(&crate::TerraformOp {
                kind: strata_protocol::TerraformKind::SphereAdd,
                center: Vec3::new(-10.0, 0.5, 0.5),
                radius: 1.0,
                material: 1,
            })
            .unwrap();
        let hit = raycast(&store, Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_X, 32.0).unwrap();
        assert_eq!(hit.voxel, IVec3::new(-10, 0, 0));
        assert_eq!(hit.normal, IVec3::new(1, 0, 0));
        assert!((hit.distance - 9.5).abs() < 1e-4);
    }
}
