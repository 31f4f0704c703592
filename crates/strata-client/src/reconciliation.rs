//! Server reconciliation of the predicted local player.
//!
//! Each snapshot acknowledges the last input the server processed together
//! with the authoritative body state after it. Acknowledged inputs are
//! dropped; if the prediction at that sequence id is off by more than the
//! correction threshold, the body is rebuilt from the authoritative state by
//! replaying the remaining inputs.

use glam::Vec3;
use strata_protocol::{MotionState, PlayerAck, step_motion};

use crate::prediction::ClientPredictor;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Positional error, in world units, tolerated without a correction. Covers
/// the 1e-3 rounding of wire vectors.
pub const DEFAULT_CORRECTION_THRESHOLD: f32 = 0.05;

/// Positional error beyond which the correction is shown as a teleport.
pub const DEFAULT_SNAP_THRESHOLD: f32 = 2.0;

/// Exponential decay rate of the visual offset, per second.
pub const DEFAULT_DECAY_RATE: f32 = 10.0;

/// Offsets shorter than this are zeroed.
const MIN_OFFSET: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileConfig {
    pub correction_threshold: f32,
    pub snap_threshold: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            correction_threshold: DEFAULT_CORRECTION_THRESHOLD,
            snap_threshold: DEFAULT_SNAP_THRESHOLD,
        }
    }
}

/// What [`reconcile`] did to the predicted state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Prediction agreed with the server.
    InSync,
    /// Rebuilt from the server state; `delta` is the shift of the predicted
    /// position and should be smoothed.
    Corrected { error: f32, delta: Vec3 },
    /// Rebuilt after a large desync; the view should jump.
    Snapped { error: f32, delta: Vec3 },
}

// ---------------------------------------------------------------------------
// reconcile
// ---------------------------------------------------------------------------

/// Apply a snapshot acknowledgement to the predictor.
///
/// An acknowledgement without a matching buffered prediction (nothing
/// processed yet, or the entry was evicted) always rebuilds from the server
/// state and is judged by how far the rebuild moved the body.
pub fn reconcile(
    predictor: &mut ClientPredictor,
    ack: &PlayerAck,
    config: &ReconcileConfig,
) -> ReconcileOutcome {
    let params = *predictor.params();
    let dt = predictor.dt();
    let (state, buffer) = predictor.parts_mut();

    let predicted_error = buffer
        .get(ack.seq)
        .map(|e| e.predicted.position.distance(ack.p));
    buffer.discard_through(ack.seq);

    if predicted_error.is_some_and(|e| e <= config.correction_threshold) {
        return ReconcileOutcome::InSync;
    }

    let before = state.position;
    let mut rebuilt = MotionState {
        position: ack.p,
        velocity: ack.v,
        grounded: ack.g,
    };
    for entry in buffer.iter_mut() {
        rebuilt = step_motion(&rebuilt, &entry.input, dt, &params);
        entry.predicted = rebuilt;
    }
    *state = rebuilt;

    let delta = rebuilt.position - before;
    let error = predicted_error.unwrap_or_else(|| delta.length());
    if error <= config.correction_threshold {
        ReconcileOutcome::InSync
    } else if error > config.snap_threshold {
        ReconcileOutcome::Snapped { error, delta }
    } else {
        ReconcileOutcome::Corrected { error, delta }
    }
}

// ---------------------------------------------------------------------------
// CorrectionSmoothing
// ---------------------------------------------------------------------------

/// Visual offset that hides small corrections.
///
/// The logical position moves at once; the rendered position starts at the
/// old spot and the offset decays toward zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionSmoothing {
    offset: Vec3,
    pub decay_rate: f32,
}

impl CorrectionSmoothing {
    pub fn new(decay_rate: f32) -> Self {
        Self {
            offset: Vec3::ZERO,
            decay_rate,
        }
    }

    /// Fold in a reconciliation result.
    pub fn apply(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::InSync => {}
            ReconcileOutcome::Corrected { delta, .. } => self.offset -= *delta,
            ReconcileOutcome::Snapped { .. } => self.offset = Vec3::ZERO,
        }
    }

    /// Decay the offset over `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.offset *= (-self.decay_rate * dt).exp();
        if self.offset.length_squared() < MIN_OFFSET * MIN_OFFSET {
            self.offset = Vec3::ZERO;
        }
    }

    /// Offset to add to the logical position when rendering.
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn is_zero(&self) -> bool {
        self.offset == Vec3::ZERO
    }
}

impl Default for CorrectionSmoothing {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::{MotionInput, MotionParams};

    fn predictor_with_inputs(n: usize) -> ClientPredictor {
        let mut p = ClientPredictor::new(MotionParams::default(), 60, MotionState::at(Vec3::ZERO));
        for _ in 0..n {
            p.apply_local_input(Vec3::X, Vec3::Z, 0);
        }
        p
    }

    fn ack(seq: u32, p: Vec3) -> PlayerAck {
        PlayerAck {
            seq,
            p,
            v: Vec3::new(5.0, 0.0, 0.0),
            g: true,
        }
    }

    #[test]
    fn test_matching_ack_keeps_prediction() {
        let mut p = predictor_with_inputs(3);
        let predicted_at_2 = p.buffer().get(2).map(|e| e.predicted.position);
        let before = *p.state();

        let outcome = reconcile(
            &mut p,
            &ack(2, predicted_at_2.unwrap_or_default()),
            &ReconcileConfig::default(),
        );
        assert_eq!(outcome, ReconcileOutcome::InSync);
        assert_eq!(*p.state(), before);
        assert_eq!(p.buffer().len(), 1);
    }

    #[test]
    fn test_ack_discards_and_replays_remaining_input() {
        // Inputs 1, 2, 3 sent; the server acknowledges 2 at a different spot.
        let mut p = predictor_with_inputs(3);
        let server = Vec3::new(0.5, 0.0, 0.0);

        let outcome = reconcile(&mut p, &ack(2, server), &ReconcileConfig::default());
        assert!(matches!(outcome, ReconcileOutcome::Corrected { .. }));
        assert_eq!(p.buffer().iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3]);

        let expected = step_motion(
            &MotionState {
                position: server,
                velocity: Vec3::new(5.0, 0.0, 0.0),
                grounded: true,
            },
            &MotionInput {
                movement: Vec3::X,
                flags: 0,
            },
            1.0 / 60.0,
            &MotionParams::default(),
        );
        assert_eq!(*p.state(), expected);
        assert_eq!(p.buffer().get(3).map(|e| e.predicted), Some(expected));
    }

    #[test]
    fn test_large_error_snaps() {
        let mut p = predictor_with_inputs(2);
        let outcome = reconcile(
            &mut p,
            &ack(1, Vec3::new(50.0, 0.0, 0.0)),
            &ReconcileConfig::default(),
        );
        assert!(matches!(outcome, ReconcileOutcome::Snapped { error, .. } if error > 40.0));

        let mut smoothing = CorrectionSmoothing::default();
        smoothing.apply(&outcome);
        assert!(smoothing.is_zero());
    }

    #[test]
    fn test_ack_of_evicted_input_rebuilds() {
        let mut p = predictor_with_inputs(1);
        let outcome = reconcile(&mut p, &ack(0, Vec3::ZERO), &ReconcileConfig::default());
        // Input 1 is still unacknowledged and replayed from the origin.
        assert_eq!(outcome, ReconcileOutcome::InSync);
        assert_eq!(p.buffer().len(), 1);
        assert!((p.state().position.x - 5.0 / 60.0).abs() < 1e-6);

        let outcome = reconcile(
            &mut p,
            &ack(0, Vec3::new(1.0, 0.0, 0.0)),
            &ReconcileConfig::default(),
        );
        assert!(matches!(outcome, ReconcileOutcome::Corrected { error, .. } if (error - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_small_correction_smooths_then_decays() {
        let mut smoothing = CorrectionSmoothing::default();
        smoothing.apply(&ReconcileOutcome::Corrected {
            error: 0.3,
            delta: Vec3::new(0.3, 0.0, 0.0),
        });
        assert_eq!(smoothing.offset(), Vec3::new(-0.3, 0.0, 0.0));

        smoothing.update(0.1);
        assert!(smoothing.offset().x > -0.3 && smoothing.offset().x < 0.0);

        for _ in 0..100 {
            smoothing.update(0.1);
        }
        assert!(smoothing.is_zero());
    }
}
