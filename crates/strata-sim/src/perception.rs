//! NPC perception: sensing players and tracking detection state.
//!
//! Every pass each NPC tests every player for range, field of view and
//! line of sight. Seeing anyone ramps the suspicion level up, seeing no one
//! decays it. The level drives the state machine:
//!
//! ```text
//!   Idle --(>= suspicious)--> Suspicious --(>= spotted)--> Spotted
//!   Idle <-----(== 0)-------- Suspicious <-(< suspicious)-- Spotted
//! ```
//!
//! Each crossing emits exactly one [`NpcEvent`]. A pass that leaves the state
//! unchanged emits nothing.

use std::collections::BTreeMap;

use glam::Vec3;
use strata_config::PerceptionConfig;
use strata_protocol::{DetectionState, EntityKind, NpcEvent, NpcEventKind};
use strata_voxel::{ChunkStore, raycast};

use crate::collision::segment_sphere;
use crate::entity::{Entity, EntityId};
use crate::error::SubsystemFault;
use crate::registry::EntityRegistry;

/// Sensing parameters in simulation units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptionParams {
    pub sense_range: f32,
    /// Cosine of half the field of view.
    pub half_fov_cos: f32,
    pub ramp_time: f32,
    pub decay_time: f32,
    pub suspicious_threshold: f32,
    pub spotted_threshold: f32,
    pub eye_height: f32,
    /// Radius of props that block line of sight.
    pub blocker_radius: f32,
}

impl PerceptionParams {
    pub fn from_config(config: &PerceptionConfig, blocker_radius: f32) -> Self {
        Self {
            sense_range: config.sense_range,
            half_fov_cos: (config.fov_degrees.to_radians() * 0.5).cos(),
            ramp_time: config.ramp_time_secs.max(f32::EPSILON),
            decay_time: config.decay_time_secs.max(f32::EPSILON),
            suspicious_threshold: config.suspicious_threshold,
            spotted_threshold: config.spotted_threshold,
            eye_height: config.eye_height,
            blocker_radius,
        }
    }
}

impl Default for PerceptionParams {
    fn default() -> Self {
        Self::from_config(&PerceptionConfig::default(), 0.5)
    }
}

/// Detection state of one NPC.
#[derive(Debug, Clone, PartialEq)]
pub struct NpcPerception {
    pub npc_id: EntityId,
    pub state: DetectionState,
    /// Awareness in `[0, 1]`.
    pub suspicion: f32,
    /// The player being tracked while `Spotted`.
    pub target: Option<EntityId>,
}

impl NpcPerception {
    pub fn new(npc_id: EntityId) -> Self {
        Self {
            npc_id,
            state: DetectionState::Idle,
            suspicion: 0.0,
            target: None,
        }
    }
}

/// New per-NPC records and the events one pass produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerceptionPlan {
    pub records: BTreeMap<EntityId, NpcPerception>,
    pub events: Vec<NpcEvent>,
}

/// Owns detection state for every NPC.
#[derive(Debug, Default)]
pub struct PerceptionSystem {
    params: PerceptionParams,
    npcs: BTreeMap<EntityId, NpcPerception>,
}

impl PerceptionSystem {
    pub fn new(params: PerceptionParams) -> Self {
        Self {
            params,
            npcs: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &PerceptionParams {
        &self.params
    }

    /// Current record of an NPC, if it has been through a pass.
    pub fn get(&self, npc_id: EntityId) -> Option<&NpcPerception> {
        self.npcs.get(&npc_id)
    }

    /// Whether `npc` can currently see `target`.
    pub fn can_see(
        &self,
        npc: &Entity,
        target: &Entity,
        registry: &EntityRegistry,
        terrain: &ChunkStore,
    ) -> bool {
        let eye = npc.position + Vec3::Y * self.params.eye_height;
        let target_eye = target.position + Vec3::Y * self.params.eye_height;
        let to_target = target_eye - eye;
        let distance = to_target.length();
        if distance > self.params.sense_range {
            return false;
        }
        let Some(dir) = to_target.try_normalize() else {
            return true;
        };
        if npc.forward().dot(dir) < self.params.half_fov_cos {
            return false;
        }
        if raycast(terrain, eye, dir, distance).is_some() {
            return false;
        }
        !registry.query_by_type(EntityKind::Prop).any(|prop| {
            segment_sphere(eye, target_eye, prop.position, self.params.blocker_radius).is_some()
        })
    }

    /// Run one pass covering `elapsed` seconds without mutating anything.
    pub fn plan(
        &self,
        registry: &EntityRegistry,
        terrain: &ChunkStore,
        elapsed: f32,
        tick: u64,
    ) -> Result<PerceptionPlan, SubsystemFault> {
        let players: Vec<&Entity> = registry
            .ids_of_type(EntityKind::Player)
            .into_iter()
            .filter_map(|id| registry.get(id))
            .collect();
        for player in &players {
            if !player.position.is_finite() {
                return Err(SubsystemFault::NonFinitePosition(player.id));
            }
        }

        let mut plan = PerceptionPlan::default();
        for npc_id in registry.ids_of_type(EntityKind::Npc) {
            let Some(npc) = registry.get(npc_id) else {
                continue;
            };
            if !npc.position.is_finite() {
                return Err(SubsystemFault::NonFinitePosition(npc_id));
            }

            // Nearest visible player, lower id on ties.
            let mut nearest: Option<(f32, EntityId)> = None;
            for player in &players {
                if self.can_see(npc, player, registry, terrain) {
                    let d = npc.position.distance_squared(player.position);
                    if nearest.is_none_or(|(best, _)| d < best) {
                        nearest = Some((d, player.id));
                    }
                }
            }

            let mut record = self
                .npcs
                .get(&npc_id)
                .cloned()
                .unwrap_or_else(|| NpcPerception::new(npc_id));
            let delta = if nearest.is_some() {
                elapsed / self.params.ramp_time
            } else {
                -elapsed / self.params.decay_time
            };
            record.suspicion = (record.suspicion + delta).clamp(0.0, 1.0);

            self.transition(
                &mut record,
                nearest.map(|(_, id)| id),
                registry,
                tick,
                &mut plan.events,
            );
            plan.records.insert(npc_id, record);
        }
        Ok(plan)
    }

    fn transition(
        &self,
        record: &mut NpcPerception,
        nearest: Option<EntityId>,
        registry: &EntityRegistry,
        tick: u64,
        events: &mut Vec<NpcEvent>,
    ) {
        let p = &self.params;

        if record.state == DetectionState::Spotted {
            let target_gone = record.target.is_none_or(|t| !registry.contains(t));
            if record.suspicion < p.suspicious_threshold || target_gone {
                record.state = DetectionState::Suspicious;
                record.target = None;
                events.push(npc_event(record, tick, NpcEventKind::Lost));
            }
        }
        if record.state == DetectionState::Idle && record.suspicion >= p.suspicious_threshold {
            record.state = DetectionState::Suspicious;
            events.push(npc_event(record, tick, NpcEventKind::SuspicionChanged));
        }
        if record.state == DetectionState::Suspicious
            && record.suspicion >= p.spotted_threshold
            && let Some(target) = nearest
        {
            record.state = DetectionState::Spotted;
            record.target = Some(target);
            events.push(npc_event(record, tick, NpcEventKind::Spotted));
        }
        if record.state == DetectionState::Suspicious && record.suspicion <= 0.0 {
            record.state = DetectionState::Idle;
            events.push(npc_event(record, tick, NpcEventKind::SuspicionChanged));
        }
    }

    /// Replace detection state with a plan's records. NPCs absent from the
    /// plan are forgotten.
    pub fn commit(&mut self, plan: PerceptionPlan) -> Vec<NpcEvent> {
        self.npcs = plan.records;
        plan.events
    }

    /// Forget NPCs whose entities are gone.
    pub fn retain_live(&mut self, registry: &EntityRegistry) {
        self.npcs.retain(|id, _| registry.contains(*id));
    }
}

fn npc_event(record: &NpcPerception, tick: u64, event: NpcEventKind) -> NpcEvent {
    NpcEvent {
        npc_id: record.npc_id,
        event,
        state: record.state,
        target_id: record.target,
        suspicion: record.suspicion,
        tick,
    }
}
