//! Projectile flight and hit resolution.
//!
//! Each tick a projectile sweeps the segment from its current position to
//! `position + direction * speed * dt`. The sweep is tested against every
//! non-projectile entity except the owner (as spheres of the configured
//! target radius) and against solid terrain. The nearest contact wins; an
//! entity beats terrain at equal distance and lower ids beat higher ones.

use std::collections::BTreeMap;

use glam::Vec3;
use strata_config::ProjectileConfig;
use strata_protocol::{EntityKind, ProjectileHit};
use strata_voxel::{ChunkStore, raycast};
use tracing::debug;

use crate::collision::segment_sphere;
use crate::entity::{EntityId, EntityInit, yaw_from_direction};
use crate::error::SubsystemFault;
use crate::registry::{EntityRegistry, RegistryError};

/// Limits applied to every spawned projectile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileParams {
    pub target_radius: f32,
    pub max_speed: f32,
    pub max_ttl_ticks: u32,
}

impl Default for ProjectileParams {
    fn default() -> Self {
        Self::from(&ProjectileConfig::default())
    }
}

impl From<&ProjectileConfig> for ProjectileParams {
    fn from(config: &ProjectileConfig) -> Self {
        Self {
            target_radius: config.target_radius,
            max_speed: config.max_speed,
            max_ttl_ticks: config.max_ttl_ticks,
        }
    }
}

/// Reasons a spawn is refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectileError {
    #[error("projectile direction must be finite and non-zero")]
    InvalidDirection,

    #[error("projectile origin must be finite")]
    InvalidOrigin,

    #[error("projectile speed {speed} outside (0, {max}]")]
    InvalidSpeed { speed: f32, max: f32 },

    #[error("projectile ttl {ttl} outside 1..={max} ticks")]
    InvalidTtl { ttl: u32, max: u32 },
}

/// Flight data of one live projectile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileState {
    pub entity_id: EntityId,
    pub owner: Option<EntityId>,
    /// Unit direction of flight.
    pub direction: Vec3,
    pub speed: f32,
    pub damage: f32,
    pub spawn_tick: u64,
    pub ttl_ticks: u32,
}

/// What happens to one projectile this tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectileOutcome {
    /// No contact; move to `position`.
    Advance { id: EntityId, position: Vec3 },
    /// First contact along the sweep.
    Hit {
        id: EntityId,
        target: Option<EntityId>,
        point: Vec3,
        normal: Vec3,
    },
    /// Lifetime over without contact.
    Expire { id: EntityId },
    /// The backing entity is gone; forget the flight data.
    Orphaned { id: EntityId },
}

/// Projectile results of one tick, in projectile id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectilePlan {
    pub outcomes: Vec<ProjectileOutcome>,
}

/// Outcome of committing a [`ProjectilePlan`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectileReport {
    pub hits: Vec<ProjectileHit>,
    /// Projectile entities removed this tick, hit or expired.
    pub despawned: Vec<EntityId>,
}

/// Owns projectile flight data. Projectile entities themselves live in the
/// [`EntityRegistry`]; only this system writes them.
#[derive(Debug, Default)]
pub struct ProjectileSystem {
    params: ProjectileParams,
    live: BTreeMap<EntityId, ProjectileState>,
}

impl ProjectileSystem {
    pub fn new(params: ProjectileParams) -> Self {
        Self {
            params,
            live: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &ProjectileParams {
        &self.params
    }

    pub fn get(&self, id: EntityId) -> Option<&ProjectileState> {
        self.live.get(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Register a projectile entity and start tracking it.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        &mut self,
        registry: &mut EntityRegistry,
        owner: Option<EntityId>,
        origin: Vec3,
        direction: Vec3,
        speed: f32,
        ttl_ticks: u32,
        damage: f32,
        tick: u64,
    ) -> Result<EntityId, ProjectileError> {
        if !origin.is_finite() {
            return Err(ProjectileError::InvalidOrigin);
        }
        let direction = direction
            .try_normalize()
            .ok_or(ProjectileError::InvalidDirection)?;
        if !(speed > 0.0 && speed <= self.params.max_speed) {
            return Err(ProjectileError::InvalidSpeed {
                speed,
                max: self.params.max_speed,
            });
        }
        if ttl_ticks == 0 || ttl_ticks > self.params.max_ttl_ticks {
            return Err(ProjectileError::InvalidTtl {
                ttl: ttl_ticks,
                max: self.params.max_ttl_ticks,
            });
        }

        let mut init = EntityInit::at(origin).with_health(1.0);
        init.velocity = direction * speed;
        init.owner = owner;
        if let Some(yaw) = yaw_from_direction(direction) {
            init = init.with_yaw(yaw);
        }
        let id = registry.register(EntityKind::Projectile, init);
        self.live.insert(
            id,
            ProjectileState {
                entity_id: id,
                owner,
                direction,
                speed,
                damage,
                spawn_tick: tick,
                ttl_ticks,
            },
        );
        debug!(id, ?owner, speed, ttl_ticks, "Projectile spawned");
        Ok(id)
    }

    /// Sweep every projectile for this tick without mutating anything.
    pub fn plan(
        &self,
        registry: &EntityRegistry,
        terrain: &ChunkStore,
        tick: u64,
        dt: f32,
    ) -> Result<ProjectilePlan, SubsystemFault> {
        let targets: Vec<_> = registry
            .sorted()
            .into_iter()
            .filter(|e| e.kind != EntityKind::Projectile)
            .collect();

        let mut outcomes = Vec::with_capacity(self.live.len());
        for (&id, state) in &self.live {
            let Some(entity) = registry.get(id) else {
                outcomes.push(ProjectileOutcome::Orphaned { id });
                continue;
            };
            let start = entity.position;
            if !start.is_finite() {
                return Err(SubsystemFault::NonFinitePosition(id));
            }
            let travel = state.speed * dt;
            let end = start + state.direction * travel;

            // (distance, target, point, normal)
            let mut best: Option<(f32, Option<EntityId>, Vec3, Vec3)> = None;
            for target in &targets {
                if Some(target.id) == state.owner {
                    continue;
                }
                if let Some(hit) =
                    segment_sphere(start, end, target.position, self.params.target_radius)
                {
                    let distance = hit.t * travel;
                    if best.is_none_or(|(d, ..)| distance < d) {
                        best = Some((distance, Some(target.id), hit.point, hit.normal));
                    }
                }
            }
            if let Some(hit) = raycast(terrain, start, state.direction, travel)
                && best.is_none_or(|(d, ..)| hit.distance < d)
            {
                best = Some((hit.distance, None, hit.point, hit.normal.as_vec3()));
            }

            let outcome = match best {
                Some((_, target, point, normal)) => ProjectileOutcome::Hit {
                    id,
                    target,
                    point,
                    normal,
                },
                None if tick.saturating_sub(state.spawn_tick) + 1 >= u64::from(state.ttl_ticks) => {
                    ProjectileOutcome::Expire { id }
                }
                None => ProjectileOutcome::Advance { id, position: end },
            };
            outcomes.push(outcome);
        }
        Ok(ProjectilePlan { outcomes })
    }

    /// Apply a plan: move, damage and despawn.
    pub fn commit(
        &mut self,
        plan: ProjectilePlan,
        registry: &mut EntityRegistry,
        tick: u64,
    ) -> Result<ProjectileReport, RegistryError> {
        let mut report = ProjectileReport::default();
        for outcome in plan.outcomes {
            match outcome {
                ProjectileOutcome::Advance { id, position } => {
                    let entity = registry.get_mut(id).ok_or(RegistryError::Missing(id))?;
                    entity.position = position;
                }
                ProjectileOutcome::Hit {
                    id,
                    target,
                    point,
                    normal,
                } => {
                    let state = self.live.remove(&id).ok_or(RegistryError::Missing(id))?;
                    if let Some(target_id) = target {
                        let victim = registry
                            .get_mut(target_id)
                            .ok_or(RegistryError::Missing(target_id))?;
                        victim.health = (victim.health - state.damage).max(0.0);
                    }
                    registry.deregister(id).ok_or(RegistryError::Missing(id))?;
                    debug!(id, ?target, tick, "Projectile hit");
                    report.hits.push(ProjectileHit {
                        projectile_id: id,
                        hit_entity_id: target,
                        hit_point: point,
                        hit_normal: normal,
                        damage: state.damage,
                        tick,
                    });
                    report.despawned.push(id);
                }
                ProjectileOutcome::Expire { id } => {
                    self.live.remove(&id);
                    registry.deregister(id).ok_or(RegistryError::Missing(id))?;
                    debug!(id, tick, "Projectile expired");
                    report.despawned.push(id);
                }
                ProjectileOutcome::Orphaned { id } => {
                    self.live.remove(&id);
                }
            }
        }
        Ok(report)
    }

    /// Drop flight data for every projectile whose entity is gone.
    pub fn retain_live(&mut self, registry: &EntityRegistry) {
        self.live.retain(|id, _| registry.contains(*id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_voxel::TerraformOp;
    use strata_protocol::TerraformKind;

    const DT: f32 = 1.0 / 60.0;

    fn setup() -> (ProjectileSystem, EntityRegistry, ChunkStore) {
        (
            ProjectileSystem::new(ProjectileParams::default()),
            EntityRegistry::new(),
            ChunkStore::default(),
        )
    }

    fn run_tick(
        system: &mut ProjectileSystem,
        registry: &mut EntityRegistry,
        terrain: &ChunkStore,
        tick: u64,
    ) -> ProjectileReport {
        let plan = system.plan(registry, terrain, tick, DT).unwrap();
        system.commit(plan, registry, tick).unwrap()
    }

    #[test]
    fn test_spawn_validation() {
        let (mut system, mut registry, _) = setup();
        assert_eq!(
            system.spawn(&mut registry, None, Vec3::ZERO, Vec3::ZERO, 10.0, 10, 1.0, 0),
            Err(ProjectileError::InvalidDirection)
        );
        assert!(matches!(
            system.spawn(&mut registry, None, Vec3::ZERO, Vec3::Z, 1e6, 10, 1.0, 0),
            Err(ProjectileError::InvalidSpeed { .. })
        ));
        assert!(matches!(
            system.spawn(&mut registry, None, Vec3::ZERO, Vec3::Z, 10.0, 0, 1.0, 0),
            Err(ProjectileError::InvalidTtl { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_hit_on_first_crossing_tick() {
        let (mut system, mut registry, terrain) = setup();
        let target = registry.register(EntityKind::Npc, EntityInit::at(Vec3::new(0.0, 0.0, 10.0)));
        let id = system
            .spawn(&mut registry, None, Vec3::ZERO, Vec3::Z, 20.0, 600, 25.0, 0)
            .unwrap();

        // Per-tick travel is 1/3; the bound starts at z = 9.5.
        for tick in 0..28 {
            let report = run_tick(&mut system, &mut registry, &terrain, tick);
            assert!(report.hits.is_empty(), "early hit at tick {tick}");
        }
        let report = run_tick(&mut system, &mut registry, &terrain, 28);
        assert_eq!(report.hits.len(), 1);
        let hit = &report.hits[0];
        assert_eq!(hit.projectile_id, id);
        assert_eq!(hit.hit_entity_id, Some(target));
        assert!((hit.hit_point.z - 9.5).abs() < 1e-3);
        assert!(registry.get(id).is_none());
        assert!(system.is_empty());
        assert_eq!(registry.get(target).unwrap().health, 75.0);
    }

    #[test]
    fn test_owner_is_never_hit() {
        let (mut system, mut registry, terrain) = setup();
        let owner = registry.register(EntityKind::Player, EntityInit::default());
        system
            .spawn(&mut registry, Some(owner), Vec3::ZERO, Vec3::Z, 20.0, 5, 10.0, 0)
            .unwrap();
        let report = run_tick(&mut system, &mut registry, &terrain, 0);
        assert!(report.hits.is_empty());
        assert_eq!(registry.get(owner).unwrap().health, 100.0);
    }

    #[test]
    fn test_nearest_target_wins() {
        let (mut system, mut registry, terrain) = setup();
        let far = registry.register(EntityKind::Npc, EntityInit::at(Vec3::new(0.0, 0.0, 2.0)));
        let near = registry.register(EntityKind::Npc, EntityInit::at(Vec3::new(0.0, 0.0, 1.0)));
        system
            .spawn(&mut registry, None, Vec3::ZERO, Vec3::Z, 180.0, 5, 10.0, 0)
            .unwrap();
        let report = run_tick(&mut system, &mut registry, &terrain, 0);
        assert_eq!(report.hits[0].hit_entity_id, Some(near));
        assert_eq!(registry.get(far).unwrap().health, 100.0);
    }

    #[test]
    fn test_terrain_hit_has_no_entity() {
        let (mut system, mut registry, mut terrain) = setup();
        terrain
            .apply_terraform(&TerraformOp {
                kind: TerraformKind::SphereAdd,
                center: Vec3::new(0.5, 0.5, 3.5),
                radius: 0.6,
                material: 1,
            })
            .unwrap();
        system
            .spawn(&mut registry, None, Vec3::new(0.5, 0.5, 0.0), Vec3::Z, 60.0, 5, 10.0, 0)
            .unwrap();
        let mut hits = Vec::new();
        for tick in 0..5 {
            hits.extend(run_tick(&mut system, &mut registry, &terrain, tick).hits);
        }
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hit_entity_id, None);
        assert!((hits[0].hit_point.z - 3.0).abs() < 1e-4);
        assert_eq!(hits[0].hit_normal, Vec3::NEG_Z);
    }

    #[test]
    fn test_ttl_expiry_is_silent() {
        let (mut system, mut registry, terrain) = setup();
        let id = system
            .spawn(&mut registry, None, Vec3::ZERO, Vec3::Z, 10.0, 3, 1.0, 5)
            .unwrap();
        assert!(run_tick(&mut system, &mut registry, &terrain, 5).despawned.is_empty());
        assert!(run_tick(&mut system, &mut registry, &terrain, 6).despawned.is_empty());
        let report = run_tick(&mut system, &mut registry, &terrain, 7);
        assert!(report.hits.is_empty());
        assert_eq!(report.despawned, vec![id]);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let (mut system, mut registry, terrain) = setup();
        registry.register(EntityKind::Npc, EntityInit::at(Vec3::new(0.3, 0.0, 1.0)));
        registry.register(EntityKind::Npc, EntityInit::at(Vec3::new(-0.3, 0.0, 1.0)));
        system
            .spawn(&mut registry, None, Vec3::ZERO, Vec3::Z, 120.0, 5, 1.0, 0)
            .unwrap();
        let a = system.plan(&registry, &terrain, 0, DT).unwrap();
        let b = system.plan(&registry, &terrain, 0, DT).unwrap();
        assert_eq!(a, b);
        // Equal distances resolve to the lower id.
        assert!(matches!(
            a.outcomes[0],
            ProjectileOutcome::Hit { target: Some(1), .. }
        ));
    }
}
