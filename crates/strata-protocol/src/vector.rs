//! Serde adapters for vectors on the wire.
//!
//! Vectors travel as `[x, y, z]` arrays with every component rounded to
//! [`VECTOR_PRECISION`]. Use with `#[serde(with = "crate::vector::vec3")]`.

use glam::Vec3;

/// Wire precision of vector components.
pub const VECTOR_PRECISION: f64 = 1e-3;

/// Reciprocal of [`VECTOR_PRECISION`]. Dividing by an exact integer keeps the
/// rounded value at its shortest decimal form.
const VECTOR_SCALE: f64 = 1000.0;

/// Rounds a single component to wire precision.
pub fn quantize_component(value: f32) -> f64 {
    ((value as f64) * VECTOR_SCALE).round() / VECTOR_SCALE
}

/// Returns the vector a receiver will observe after a wire round trip.
pub fn quantize(v: Vec3) -> Vec3 {
    Vec3::new(
        quantize_component(v.x) as f32,
        quantize_component(v.y) as f32,
        quantize_component(v.z) as f32,
    )
}

/// `Vec3` as a rounded 3-element array.
pub mod vec3 {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::quantize_component;

    pub fn serialize<S: Serializer>(v: &Vec3, serializer: S) -> Result<S::Ok, S::Error> {
        [
            quantize_component(v.x),
            quantize_component(v.y),
            quantize_component(v.z),
        ]
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(deserializer)?;
        Ok(Vec3::new(x, y, z))
    }
}

/// `Option<Vec3>` as a rounded 3-element array or `null`.
pub mod opt_vec3 {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::quantize_component;

    pub fn serialize<S: Serializer>(v: &Option<Vec3>, serializer: S) -> Result<S::Ok, S::Error> {
        v.map(|v| {
            [
                quantize_component(v.x),
                quantize_component(v.y),
                quantize_component(v.z),
            ]
        })
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec3>, D::Error> {
        let raw = Option::<[f32; 3]>::deserialize(deserializer)?;
        Ok(raw.map(|[x, y, z]| Vec3::new(x, y, z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "vec3")]
        p: Vec3,
        #[serde(with = "opt_vec3", default)]
        q: Option<Vec3>,
    }

    #[test]
    fn test_vector_serializes_as_array() {
        let h = Holder {
            p: Vec3::new(1.0, -2.5, 0.25),
            q: None,
        };
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"p":[1.0,-2.5,0.25],"q":null}"#);
    }

    #[test]
    fn test_components_rounded_to_millis() {
        let h = Holder {
            p: Vec3::new(1.23456, 0.0004, -9.9996),
            q: Some(Vec3::new(0.0015, 0.0, 0.0)),
        };
        let json = serde_json::to_string(&h).unwrap();
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert!((back.p.x - 1.235).abs() < 1e-6);
        assert_eq!(back.p.y, 0.0);
        assert!((back.p.z + 10.0).abs() < 1e-6);
        assert!(back.q.is_some());
    }

    #[test]
    fn test_quantize_matches_wire_result() {
        let v = Vec3::new(3.14159, -0.00049, 100.0005);
        let h = Holder { p: v, q: None };
        let back: Holder = serde_json::from_str(&serde_json::to_string(&h).unwrap()).unwrap();
        assert!((back.p - quantize(v)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_missing_optional_vector_defaults_to_none() {
        let back: Holder = serde_json::from_str(r#"{"p":[0,0,0]}"#).unwrap();
        assert!(back.q.is_none());
    }
}
