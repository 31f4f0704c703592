//! Client-side prediction of the local player.
//!
//! Local input is applied immediately with the same [`step_motion`] the
//! server runs. Each applied frame is kept in a [`PredictionBuffer`] with the
//! state it produced, so reconciliation can replay whatever the server has
//! not acknowledged yet.

use std::collections::VecDeque;

use glam::Vec3;
use strata_protocol::{InputFrame, MotionInput, MotionParams, MotionState, step_motion};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default capacity of the prediction buffer (about 2 s at 60 Hz).
pub const DEFAULT_BUFFER_SIZE: usize = 128;

// ---------------------------------------------------------------------------
// PredictionBuffer
// ---------------------------------------------------------------------------

/// One locally applied input and the state it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionEntry {
    pub seq: u32,
    pub input: MotionInput,
    pub predicted: MotionState,
}

/// Bounded queue of unacknowledged inputs in increasing sequence order.
#[derive(Debug, Clone)]
pub struct PredictionBuffer {
    entries: VecDeque<PredictionEntry>,
    max_size: usize,
}

impl PredictionBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: PredictionEntry) {
        if self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn get(&self, seq: u32) -> Option<&PredictionEntry> {
        self.entries.iter().find(|e| e.seq == seq)
    }

    /// Drop every entry with `seq <= acked`.
    pub fn discard_through(&mut self, acked: u32) {
        while self.entries.front().is_some_and(|e| e.seq <= acked) {
            self.entries.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PredictionEntry> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PredictionEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for PredictionBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

// ---------------------------------------------------------------------------
// ClientPredictor
// ---------------------------------------------------------------------------

/// Predicted state of the local player plus its input history.
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    state: MotionState,
    params: MotionParams,
    dt: f32,
    next_seq: u32,
    client_tick: u64,
    buffer: PredictionBuffer,
}

impl ClientPredictor {
    pub fn new(params: MotionParams, tick_rate: u32, start: MotionState) -> Self {
        Self {
            state: start,
            params,
            dt: 1.0 / tick_rate.max(1) as f32,
            next_seq: 1,
            client_tick: 0,
            buffer: PredictionBuffer::default(),
        }
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn params(&self) -> &MotionParams {
        &self.params
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn buffer(&self) -> &PredictionBuffer {
        &self.buffer
    }

    /// Sequence id the next input will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Move the body without touching the input history, e.g. on spawn.
    pub fn reset(&mut self, state: MotionState) {
        self.state = state;
        self.buffer.clear();
    }

    /// Apply one tick of local input and return the frame to send.
    pub fn apply_local_input(&mut self, movement: Vec3, aim: Vec3, flags: u32) -> InputFrame {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let input = MotionInput { movement, flags };
        self.state = step_motion(&self.state, &input, self.dt, &self.params);
        self.buffer.push(PredictionEntry {
            seq,
            input,
            predicted: self.state,
        });

        let frame = InputFrame {
            tick: self.client_tick,
            seq,
            movement,
            aim,
            flags,
        };
        self.client_tick += 1;
        frame
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut MotionState, &mut PredictionBuffer) {
        (&mut self.state, &mut self.buffer)
    }
}
