//! Entity registry: the authoritative table of live entities.
//!
//! Ids come from a monotonic counter and are never reused, even after the
//! entity is gone. Subsystems write only the entity kinds they own; the
//! single-threaded tick makes that a matter of code organization, not locks.

use glam::Vec3;
use rustc_hash::FxHashMap;
use strata_protocol::EntityKind;

use crate::entity::{Entity, EntityId, EntityInit};

/// Registry consistency violations. Any of these during a tick is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// An id is already taken.
    #[error("entity id {0} already registered")]
    DuplicateId(EntityId),

    /// An entity id is at or above the id counter.
    #[error("entity id {id} not below next id {next_id}")]
    IdAheadOfCounter { id: EntityId, next_id: EntityId },

    /// A map key disagrees with the stored entity's id.
    #[error("entity stored under {key} has id {id}")]
    KeyMismatch { key: EntityId, id: EntityId },

    /// An entity the caller relied on is missing.
    #[error("entity {0} not found")]
    Missing(EntityId),
}

/// Owns every live [`Entity`].
#[derive(Debug)]
pub struct EntityRegistry {
    entities: FxHashMap<EntityId, Entity>,
    next_id: EntityId,
}

impl EntityRegistry {
    /// An empty registry whose first id is 1.
    pub fn new() -> Self {
        Self {
            entities: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Register a new entity and return its id.
    pub fn register(&mut self, kind: EntityKind, init: EntityInit) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(
            id,
            Entity {
                id,
                kind,
                position: init.position,
                rotation: init.rotation,
                velocity: init.velocity,
                health: init.health,
                owner: init.owner,
                extra: init.extra,
            },
        );
        id
    }

    /// Remove an entity. Removing an absent id is a no-op.
    pub fn deregister(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The id the next registration will receive.
    pub fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// All entities, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All entities of one kind, unordered.
    pub fn query_by_type(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    /// Entities within `radius` of `center` (inclusive), unordered.
    pub fn query_in_radius(&self, center: Vec3, radius: f32) -> impl Iterator<Item = &Entity> {
        let radius_sq = radius * radius;
        self.entities
            .values()
            .filter(move |e| e.position.distance_squared(center) <= radius_sq)
    }

    /// Ids of one kind in ascending order, for deterministic iteration.
    pub fn ids_of_type(&self, kind: EntityKind) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.query_by_type(kind).map(|e| e.id).collect();
        ids.sort_unstable();
        ids
    }

    /// All entities in ascending id order.
    pub fn sorted(&self) -> Vec<&Entity> {
        let mut all: Vec<_> = self.entities.values().collect();
        all.sort_unstable_by_key(|e| e.id);
        all
    }

    /// Insert an entity with a stored id, advancing the counter past it.
    pub fn restore(&mut self, entity: Entity) -> Result<(), RegistryError> {
        if self.entities.contains_key(&entity.id) {
            return Err(RegistryError::DuplicateId(entity.id));
        }
        self.next_id = self.next_id.max(entity.id + 1);
        self.entities.insert(entity.id, entity);
        Ok(())
    }

    /// Raise the id counter to at least `next_id`.
    pub fn reserve_ids_below(&mut self, next_id: EntityId) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Check that every key matches its entity and all ids are below the
    /// counter.
    pub fn check_invariants(&self) -> Result<(), RegistryError> {
        for (&key, entity) in &self.entities {
            if key != entity.id {
                return Err(RegistryError::KeyMismatch { key, id: entity.id });
            }
            if entity.id >= self.next_id {
                return Err(RegistryError::IdAheadOfCounter {
                    id: entity.id,
                    next_id: self.next_id,
                });
            }
        }
        Ok(())
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut reg = EntityRegistry::new();
        let a = reg.register(EntityKind::Player, EntityInit::default());
        let b = reg.register(EntityKind::Npc, EntityInit::default());
        assert!(b > a);
        reg.deregister(b);
        let c = reg.register(EntityKind::Prop, EntityInit::default());
        assert!(c > b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let mut reg = EntityRegistry::new();
        let id = reg.register(EntityKind::Npc, EntityInit::default());
        assert!(reg.deregister(id).is_some());
        assert!(reg.deregister(id).is_none());
        assert!(reg.get(id).is_none());
    }

    #[test]
    fn test_query_by_type() {
        let mut reg = EntityRegistry::new();
        reg.register(EntityKind::Npc, EntityInit::default());
        reg.register(EntityKind::Player, EntityInit::default());
        reg.register(EntityKind::Npc, EntityInit::default());
        assert_eq!(reg.query_by_type(EntityKind::Npc).count(), 2);
        assert_eq!(reg.ids_of_type(EntityKind::Npc), vec![1, 3]);
        assert_eq!(reg.query_by_type(EntityKind::Projectile).count(), 0);
    }

    #[test]
    fn test_query_in_radius_inclusive() {
        let mut reg = EntityRegistry::new();
        let near = reg.register(EntityKind::Prop, EntityInit::at(Vec3::new(3.0, 0.0, 4.0)));
        reg.register(EntityKind::Prop, EntityInit::at(Vec3::new(10.0, 0.0, 0.0)));
        let hits: Vec<_> = reg.query_in_radius(Vec3::ZERO, 5.0).map(|e| e.id).collect();
        assert_eq!(hits, vec![near]);
    }

    #[test]
    fn test_restore_advances_counter() {
        let mut source = EntityRegistry::new();
        for _ in 0..5 {
            source.register(EntityKind::Npc, EntityInit::default());
        }
        let saved = source.get(5).unwrap().clone();

        let mut reg = EntityRegistry::new();
        reg.restore(saved.clone()).unwrap();
        assert_eq!(reg.next_id(), 6);
        assert_eq!(reg.restore(saved), Err(RegistryError::DuplicateId(5)));
        assert_eq!(reg.register(EntityKind::Prop, EntityInit::default()), 6);
        assert!(reg.check_invariants().is_ok());
    }

    #[test]
    fn test_reserve_never_lowers_counter() {
        let mut reg = EntityRegistry::new();
        reg.reserve_ids_below(10);
        reg.reserve_ids_below(3);
        assert_eq!(reg.next_id(), 10);
    }

    #[test]
    fn test_invariant_check_catches_key_mismatch() {
        let mut reg = EntityRegistry::new();
        let id = reg.register(EntityKind::Npc, EntityInit::default());
        reg.get_mut(id).unwrap().id = 99;
        assert!(matches!(
            reg.check_invariants(),
            Err(RegistryError::KeyMismatch { .. })
        ));
    }
}
