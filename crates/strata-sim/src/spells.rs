//! Spell book lookup and cast resolution.
//!
//! A cast is resolved into a concrete [`SpellEffect`] against the caster's
//! current position. The simulation executes the effect in the input phase.

use std::collections::BTreeMap;

use glam::Vec3;
use strata_config::{SpellDef, SpellsConfig};
use strata_voxel::TerraformOp;

use crate::entity::Entity;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpellError {
    #[error("unknown spell '{0}'")]
    Unknown(String),

    #[error("cast direction must be finite and non-zero")]
    InvalidDirection,
}

/// What a resolved cast does.
#[derive(Debug, Clone, PartialEq)]
pub enum SpellEffect {
    Projectile {
        origin: Vec3,
        direction: Vec3,
        speed: f32,
        ttl_ticks: u32,
        damage: f32,
    },
    Terraform {
        origin: Vec3,
        direction: Vec3,
        op: TerraformOp,
    },
}

impl SpellEffect {
    pub fn origin(&self) -> Vec3 {
        match self {
            SpellEffect::Projectile { origin, .. } | SpellEffect::Terraform { origin, .. } => {
                *origin
            }
        }
    }

    pub fn direction(&self) -> Vec3 {
        match self {
            SpellEffect::Projectile { direction, .. }
            | SpellEffect::Terraform { direction, .. } => *direction,
        }
    }
}

/// Configured spells by id.
#[derive(Debug, Clone, Default)]
pub struct SpellBook {
    spells: BTreeMap<String, SpellDef>,
}

impl SpellBook {
    pub fn new(spells: BTreeMap<String, SpellDef>) -> Self {
        Self { spells }
    }

    pub fn get(&self, spell_id: &str) -> Option<&SpellDef> {
        self.spells.get(spell_id)
    }

    pub fn contains(&self, spell_id: &str) -> bool {
        self.spells.contains_key(spell_id)
    }

    /// Resolve a cast by `caster` toward `direction`.
    ///
    /// Effects originate at the caster's eye, `eye_height` above its
    /// position.
    pub fn resolve(
        &self,
        spell_id: &str,
        caster: &Entity,
        direction: Vec3,
        eye_height: f32,
    ) -> Result<SpellEffect, SpellError> {
        let def = self
            .spells
            .get(spell_id)
            .ok_or_else(|| SpellError::Unknown(spell_id.to_string()))?;
        let direction = direction
            .try_normalize()
            .ok_or(SpellError::InvalidDirection)?;
        let origin = caster.position + Vec3::Y * eye_height;

        Ok(match *def {
            SpellDef::Projectile {
                speed,
                ttl_ticks,
                damage,
            } => SpellEffect::Projectile {
                origin,
                direction,
                speed,
                ttl_ticks,
                damage,
            },
            SpellDef::Terraform {
                op,
                radius,
                material,
                range,
            } => SpellEffect::Terraform {
                origin,
                direction,
                op: TerraformOp {
                    kind: op,
                    center: origin + direction * range,
                    radius,
                    material,
                },
            },
        })
    }
}

impl From<&SpellsConfig> for SpellBook {
    fn from(config: &SpellsConfig) -> Self {
        Self::new(config.book.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityInit;
    use crate::registry::EntityRegistry;
    use strata_protocol::{EntityKind, TerraformKind};

    fn caster() -> Entity {
        let mut registry = EntityRegistry::new();
        let id = registry.register(EntityKind::Player, EntityInit::at(Vec3::new(1.0, 0.0, 2.0)));
        registry.get(id).unwrap().clone()
    }

    #[test]
    fn test_default_book_resolves() {
        let book = SpellBook::from(&SpellsConfig::default());
        let effect = book.resolve("fireball", &caster(), Vec3::new(0.0, 0.0, -2.0), 1.6).unwrap();
        match effect {
            SpellEffect::Projectile {
                origin, direction, ..
            } => {
                assert_eq!(origin, Vec3::new(1.0, 1.6, 2.0));
                assert_eq!(direction, Vec3::NEG_Z);
            }
            other => panic!("expected projectile, got {other:?}"),
        }
    }

    #[test]
    fn test_terraform_targets_aimed_point() {
        let book = SpellBook::from(&SpellsConfig::default());
        let effect = book.resolve("dig", &caster(), Vec3::NEG_Y, 1.6).unwrap();
        let SpellEffect::Terraform { op, .. } = effect else {
            panic!("expected terraform");
        };
        assert_eq!(op.kind, TerraformKind::SphereSub);
        // Default dig range is 4.
        assert!((op.center - Vec3::new(1.0, -2.4, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_rejections() {
        let book = SpellBook::from(&SpellsConfig::default());
        assert_eq!(
            book.resolve("nope", &caster(), Vec3::X, 1.6),
            Err(SpellError::Unknown("nope".into()))
        );
        assert_eq!(
            book.resolve("fireball", &caster(), Vec3::ZERO, 1.6),
            Err(SpellError::InvalidDirection)
        );
    }
}
