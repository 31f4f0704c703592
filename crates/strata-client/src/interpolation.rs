//! Interpolation of remote entities.
//!
//! Entities the client does not control are never predicted. Received states
//! are buffered with their arrival time and rendered at `now - delay`,
//! linearly interpolated between the two bracketing samples.

use std::collections::{BTreeMap, VecDeque};

use glam::Vec3;
use strata_protocol::{EntityKind, EntityState};

/// Default render delay in seconds (two snapshots at 20 Hz).
pub const DEFAULT_DELAY: f64 = 0.1;

/// Samples kept per entity.
pub const DEFAULT_CAPACITY: usize = 32;

/// Render state of a remote entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteSample {
    pub kind: EntityKind,
    pub position: Vec3,
    pub rotation: Vec3,
    pub velocity: Vec3,
    pub health: f32,
}

impl From<&EntityState> for RemoteSample {
    fn from(s: &EntityState) -> Self {
        Self {
            kind: s.t,
            position: s.p,
            rotation: s.r,
            velocity: s.v,
            health: s.h,
        }
    }
}

/// Time-ordered samples of one entity.
#[derive(Debug, Clone)]
pub struct InterpolationBuffer {
    samples: VecDeque<(f64, RemoteSample)>,
    capacity: usize,
}

impl InterpolationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(2),
        }
    }

    /// Add a sample received at `time`. Samples older than the newest one
    /// are ignored.
    pub fn push(&mut self, time: f64, sample: RemoteSample) {
        if self.samples.back().is_some_and(|(t, _)| time < *t) {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((time, sample));
    }

    /// State at `time`, clamped to the oldest and newest samples.
    pub fn sample(&self, time: f64) -> Option<RemoteSample> {
        let (first_t, first) = self.samples.front()?;
        if time <= *first_t {
            return Some(*first);
        }
        let upper = self.samples.iter().position(|(t, _)| *t >= time);
        let Some(upper) = upper else {
            return self.samples.back().map(|(_, s)| *s);
        };

        let (t0, a) = self.samples[upper - 1];
        let (t1, b) = self.samples[upper];
        let span = t1 - t0;
        let alpha = if span > 0.0 {
            ((time - t0) / span) as f32
        } else {
            1.0
        };
        Some(RemoteSample {
            kind: b.kind,
            position: a.position.lerp(b.position, alpha),
            rotation: a.rotation.lerp(b.rotation, alpha),
            velocity: a.velocity.lerp(b.velocity, alpha),
            health: a.health + (b.health - a.health) * alpha,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Interpolation buffers for every remote entity.
#[derive(Debug, Clone)]
pub struct RemoteEntities {
    buffers: BTreeMap<u64, InterpolationBuffer>,
    delay: f64,
}

impl RemoteEntities {
    pub fn new(delay: f64) -> Self {
        Self {
            buffers: BTreeMap::new(),
            delay,
        }
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn push(&mut self, time: f64, state: &EntityState) {
        self.buffers
            .entry(state.id)
            .or_insert_with(|| InterpolationBuffer::new(DEFAULT_CAPACITY))
            .push(time, RemoteSample::from(state));
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.buffers.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.buffers.contains_key(&id)
    }

    /// Render state of one entity at `now`.
    pub fn sample(&self, id: u64, now: f64) -> Option<RemoteSample> {
        self.buffers.get(&id)?.sample(now - self.delay)
    }

    /// Render state of every entity at `now`, ordered by id.
    pub fn sample_all(&self, now: f64) -> Vec<(u64, RemoteSample)> {
        let render_time = now - self.delay;
        self.buffers
            .iter()
            .filter_map(|(id, buf)| buf.sample(render_time).map(|s| (*id, s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Default for RemoteEntities {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: u64, x: f32, h: f32) -> EntityState {
        EntityState {
            id,
            t: EntityKind::Npc,
            p: Vec3::new(x, 0.0, 0.0),
            r: Vec3::ZERO,
            v: Vec3::ZERO,
            h,
        }
    }

    #[test]
    fn test_sample_between_brackets_interpolates() {
        let mut remotes = RemoteEntities::new(0.1);
        remotes.push(1.0, &state(7, 0.0, 100.0));
        remotes.push(1.1, &state(7, 2.0, 50.0));

        // now = 1.15 renders at 1.05, halfway between the samples.
        let s = remotes.sample(7, 1.15).unwrap();
        assert!((s.position.x - 1.0).abs() < 1e-4);
        assert!((s.health - 75.0).abs() < 1e-3);
    }

    #[test]
    fn test_sample_clamps_outside_range() {
        let mut buf = InterpolationBuffer::new(8);
        assert!(buf.sample(0.0).is_none());
        buf.push(1.0, RemoteSample::from(&state(1, 3.0, 10.0)));
        buf.push(2.0, RemoteSample::from(&state(1, 5.0, 10.0)));
        assert_eq!(buf.sample(0.5).map(|s| s.position.x), Some(3.0));
        assert_eq!(buf.sample(9.0).map(|s| s.position.x), Some(5.0));
    }

    #[test]
    fn test_out_of_order_samples_ignored() {
        let mut buf = InterpolationBuffer::new(8);
        buf.push(2.0, RemoteSample::from(&state(1, 5.0, 10.0)));
        buf.push(1.0, RemoteSample::from(&state(1, 9.0, 10.0)));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_remove_forgets_entity() {
        let mut remotes = RemoteEntities::default();
        remotes.push(0.0, &state(1, 0.0, 1.0));
        remotes.push(0.0, &state(2, 0.0, 1.0));
        assert!(remotes.remove(1));
        assert_eq!(remotes.sample_all(1.0).len(), 1);
    }
}
