//! Authoritative entity records.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use strata_protocol::{EntityKind, EntityState};

/// Server-assigned entity identifier. Never reused within a world.
pub type EntityId = u64;

/// One live entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
    /// Euler angles in radians (pitch, yaw, roll).
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub health: f32,
    pub owner: Option<EntityId>,
    /// Free-form attributes.
    pub extra: BTreeMap<String, String>,
}

impl Entity {
    /// Yaw in radians. Forward is `(-sin yaw, 0, -cos yaw)`.
    pub fn yaw(&self) -> f32 {
        self.rotation.y
    }

    /// Unit forward vector on the horizontal plane.
    pub fn forward(&self) -> Vec3 {
        let yaw = self.yaw();
        Vec3::new(-yaw.sin(), 0.0, -yaw.cos())
    }

    /// Compact state for snapshots and spawn events.
    pub fn to_state(&self) -> EntityState {
        EntityState {
            id: self.id,
            t: self.kind,
            p: self.position,
            r: self.rotation,
            v: self.velocity,
            h: self.health,
        }
    }
}

/// Initial values for [`crate::EntityRegistry::register`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInit {
    pub position: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub health: f32,
    pub owner: Option<EntityId>,
    pub extra: BTreeMap<String, String>,
}

impl EntityInit {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_health(mut self, health: f32) -> Self {
        self.health = health;
        self
    }

    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.rotation.y = yaw;
        self
    }
}

impl Default for EntityInit {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            velocity: Vec3::ZERO,
            health: 100.0,
            owner: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Yaw that makes [`Entity::forward`] point along `direction` on the
/// horizontal plane. `None` for near-vertical or non-finite directions.
pub fn yaw_from_direction(direction: Vec3) -> Option<f32> {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    if !flat.is_finite() || flat.length_squared() < 1e-8 {
        return None;
    }
    Some((-flat.x).atan2(-flat.z))
}
