//! Per-client input queues keyed by sequence id.
//!
//! Frames are accepted only with a sequence id above the last one submitted
//! for that client; stale and duplicate frames are dropped silently. The tick
//! consumes at most one frame per client, always the lowest buffered id.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use strata_protocol::{InputFrame, PeerId};
use tracing::debug;

/// Default number of frames buffered per client.
pub const DEFAULT_INPUT_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct ClientQueue {
    frames: BTreeMap<u32, InputFrame>,
    last_submitted: Option<u32>,
    last_processed: u32,
}

/// Input buffers for every client.
#[derive(Debug)]
pub struct InputBuffer {
    queues: FxHashMap<PeerId, ClientQueue>,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: FxHashMap::default(),
            capacity: capacity.max(1),
        }
    }

    /// Buffer a frame. Returns `false` if it was dropped as stale or
    /// duplicate.
    ///
    /// When the queue is full the oldest buffered frame is discarded.
    pub fn submit(&mut self, client: PeerId, frame: InputFrame) -> bool {
        let queue = self.queues.entry(client).or_default();
        if queue.last_submitted.is_some_and(|last| frame.seq <= last) {
            debug!(%client, seq = frame.seq, "Dropped stale input frame");
            return false;
        }
        queue.last_submitted = Some(frame.seq);
        queue.frames.insert(frame.seq, frame);
        if queue.frames.len() > self.capacity
            && let Some((seq, _)) = queue.frames.pop_first()
        {
            debug!(%client, seq, "Input queue full, discarded oldest frame");
        }
        true
    }

    /// The frame the next [`consume_next`](Self::consume_next) would return.
    pub fn peek_next(&self, client: PeerId) -> Option<&InputFrame> {
        self.queues
            .get(&client)
            .and_then(|q| q.frames.first_key_value())
            .map(|(_, frame)| frame)
    }

    /// Pop the lowest buffered frame and mark it processed.
    pub fn consume_next(&mut self, client: PeerId) -> Option<InputFrame> {
        let queue = self.queues.get_mut(&client)?;
        let (seq, frame) = queue.frames.pop_first()?;
        queue.last_processed = queue.last_processed.max(seq);
        Some(frame)
    }

    /// Highest sequence id consumed for this client (0 before any).
    pub fn last_processed_sequence_id(&self, client: PeerId) -> u32 {
        self.queues.get(&client).map_or(0, |q| q.last_processed)
    }

    /// Number of frames waiting for this client.
    pub fn pending(&self, client: PeerId) -> usize {
        self.queues.get(&client).map_or(0, |q| q.frames.len())
    }

    /// Forget a client entirely.
    pub fn remove(&mut self, client: PeerId) {
        self.queues.remove(&client);
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_CAPACITY)
    }
}
