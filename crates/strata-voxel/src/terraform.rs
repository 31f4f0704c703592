//! Terraform operations and their validation.

use glam::Vec3;
use strata_protocol::{TerraformKind, TerraformRequest};

/// A sphere edit to apply to the chunk store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerraformOp {
    pub kind: TerraformKind,
    pub center: Vec3,
    pub radius: f32,
    /// Material written by `SphereAdd` and `Paint`. Ignored by `SphereSub`.
    pub material: u16,
}

impl From<&TerraformRequest> for TerraformOp {
    fn from(req: &TerraformRequest) -> Self {
        Self {
            kind: req.op,
            center: req.center,
            radius: req.radius,
            material: req.material,
        }
    }
}

/// Bounds a terraform operation must respect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerraformLimits {
    /// Largest accepted sphere radius.
    pub max_radius: f32,
    /// Largest accepted material id (`<= 255`).
    pub max_material: u8,
}

impl Default for TerraformLimits {
    fn default() -> Self {
        Self {
            max_radius: 16.0,
            max_material: u8::MAX,
        }
    }
}

/// Reasons a terraform operation is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TerraformError {
    /// The centre has a NaN or infinite component.
    #[error("terraform centre is not finite")]
    NonFiniteCenter,

    /// The radius is not finite or not positive.
    #[error("terraform radius {0} is not a positive finite number")]
    InvalidRadius(f32),

    /// The radius exceeds the configured maximum.
    #[error("terraform radius {radius} exceeds maximum {max}")]
    RadiusTooLarge { radius: f32, max: f32 },

    /// The material id is 0 or above the configured maximum.
    #[error("material {material} outside 1..={max}")]
    MaterialOutOfRange { material: u16, max: u8 },
}

impl TerraformOp {
    /// Check the operation against `limits`. Returns the voxel value to write.
    pub fn validate(&self, limits: &TerraformLimits) -> Result<u8, TerraformError> {
        if !self.center.is_finite() {
            return Err(TerraformError::NonFiniteCenter);
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(TerraformError::InvalidRadius(self.radius));
        }
        if self.radius > limits.max_radius {
            return Err(TerraformError::RadiusTooLarge {
                radius: self.radius,
                max: limits.max_radius,
            });
        }
        match self.kind {
            TerraformKind::SphereSub => Ok(0),
            TerraformKind::SphereAdd | TerraformKind::Paint => {
                if self.material == 0 || self.material > u16::from(limits.max_material) {
                    return Err(TerraformError::MaterialOutOfRange {
                        material: self.material,
                        max: limits.max_material,
                    });
                }
                // Bounded by max_material above.
                Ok(self.material as u8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: TerraformKind, radius: f32, material: u16) -> TerraformOp {
        TerraformOp {
            kind,
            center: Vec3::new(1.0, 2.0, 3.0),
            radius,
            material,
        }
    }

    #[test]
    fn test_valid_add() {
        let limits = TerraformLimits::default();
        assert_eq!(op(TerraformKind::SphereAdd, 3.0, 2).validate(&limits), Ok(2));
    }

    #[test]
    fn test_sub_ignores_material() {
        let limits = TerraformLimits::default();
        assert_eq!(op(TerraformKind::SphereSub, 3.0, 999).validate(&limits), Ok(0));
    }

    #[test]
    fn test_material_out_of_range() {
        let limits = TerraformLimits {
            max_radius: 8.0,
            max_material: 10,
        };
        assert!(matches!(
            op(TerraformKind::Paint, 1.0, 11).validate(&limits),
            Err(TerraformError::MaterialOutOfRange { material: 11, max: 10 })
        ));
        assert!(matches!(
            op(TerraformKind::SphereAdd, 1.0, 0).validate(&limits),
            Err(TerraformError::MaterialOutOfRange { .. })
        ));
    }

    #[test]
    fn test_radius_checks() {
        let limits = TerraformLimits::default();
        assert!(matches!(
            op(TerraformKind::SphereAdd, 0.0, 1).validate(&limits),
            Err(TerraformError::InvalidRadius(_))
        ));
        assert!(matches!(
            op(TerraformKind::SphereAdd, f32::NAN, 1).validate(&limits),
            Err(TerraformError::InvalidRadius(_))
        ));
        assert!(matches!(
            op(TerraformKind::SphereAdd, 100.0, 1).validate(&limits),
            Err(TerraformError::RadiusTooLarge { .. })
        ));
    }

    #[test]
    fn test_non_finite_center() {
        let mut o = op(TerraformKind::SphereAdd, 1.0, 1);
        o.center.y = f32::INFINITY;
        assert_eq!(
            o.validate(&TerraformLimits::default()),
            Err(TerraformError::NonFiniteCenter)
        );
    }
}
