//! Client view of one server connection.
//!
//! [`ClientSession`] consumes server messages and owns the predictor, the
//! remote interpolation buffers and the chunk cache. It never talks to a
//! socket; callers feed it decoded messages and send what it returns.

use glam::Vec3;
use strata_protocol::{
    ChunkRequest, EntityState, Handshake, HandshakeResponse, Message, MotionState,
    PROTOCOL_VERSION, StateSnapshot,
};
use tracing::{debug, info, warn};

use crate::chunk_cache::{ChunkCacheError, ClientChunkCache};
use crate::interpolation::RemoteEntities;
use crate::prediction::ClientPredictor;
use crate::reconciliation::{CorrectionSmoothing, ReconcileConfig, ReconcileOutcome, reconcile};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("server speaks protocol {server}, client speaks {client}")]
    ProtocolMismatch { server: u32, client: u32 },

    #[error("handshake rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Chunk(#[from] ChunkCacheError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    AwaitingHandshake,
    Active,
    Rejected(String),
}

/// Snapshot tick bookkeeping. Gaps are diagnostic only; later state always
/// supersedes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickTracker {
    last_tick: Option<u64>,
    expected_step: u64,
    gaps: u64,
    missed_snapshots: u64,
    stale: u64,
}

impl TickTracker {
    pub fn new(expected_step: u64) -> Self {
        Self {
            expected_step: expected_step.max(1),
            ..Self::default()
        }
    }

    /// Record a snapshot tick. Returns `false` for a tick not newer than the
    /// last one seen.
    pub fn observe(&mut self, tick: u64) -> bool {
        if let Some(last) = self.last_tick {
            if tick <= last {
                self.stale += 1;
                return false;
            }
            let step = tick - last;
            if step > self.expected_step {
                self.gaps += 1;
                self.missed_snapshots += step / self.expected_step - 1;
                debug!(last, tick, "Snapshot gap");
            }
        }
        self.last_tick = Some(tick);
        true
    }

    pub fn last_tick(&self) -> Option<u64> {
        self.last_tick
    }

    /// Number of gaps detected.
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Snapshots estimated lost across all gaps.
    pub fn missed_snapshots(&self) -> u64 {
        self.missed_snapshots
    }

    pub fn stale(&self) -> u64 {
        self.stale
    }
}

/// Client-side state of a session.
#[derive(Debug)]
pub struct ClientSession {
    client_id: String,
    status: SessionStatus,
    entity_id: Option<u64>,
    tick_rate: u32,
    predictor: Option<ClientPredictor>,
    smoothing: CorrectionSmoothing,
    reconcile: ReconcileConfig,
    last_outcome: Option<ReconcileOutcome>,
    remotes: RemoteEntities,
    chunks: ClientChunkCache,
    pending_chunk_requests: Vec<ChunkRequest>,
    ticks: TickTracker,
}

impl ClientSession {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            status: SessionStatus::AwaitingHandshake,
            entity_id: None,
            tick_rate: 60,
            predictor: None,
            smoothing: CorrectionSmoothing::default(),
            reconcile: ReconcileConfig::default(),
            last_outcome: None,
            remotes: RemoteEntities::default(),
            chunks: ClientChunkCache::new(),
            pending_chunk_requests: Vec::new(),
            ticks: TickTracker::new(3),
        }
    }

    pub fn with_reconcile_config(mut self, config: ReconcileConfig) -> Self {
        self.reconcile = config;
        self
    }

    pub fn with_interpolation_delay(mut self, delay: f64) -> Self {
        self.remotes = RemoteEntities::new(delay);
        self
    }

    /// The first message to send.
    pub fn handshake(&self, session_token: impl Into<String>) -> Message {
        Message::Handshake(Handshake {
            session_token: session_token.into(),
            client_id: self.client_id.clone(),
            protocol_version: PROTOCOL_VERSION,
        })
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn entity_id(&self) -> Option<u64> {
        self.entity_id
    }

    pub fn predictor(&self) -> Option<&ClientPredictor> {
        self.predictor.as_ref()
    }

    pub fn remotes(&self) -> &RemoteEntities {
        &self.remotes
    }

    pub fn chunks(&self) -> &ClientChunkCache {
        &self.chunks
    }

    pub fn ticks(&self) -> &TickTracker {
        &self.ticks
    }

    pub fn smoothing(&self) -> &CorrectionSmoothing {
        &self.smoothing
    }

    /// Result of the most recent reconciliation.
    pub fn last_outcome(&self) -> Option<&ReconcileOutcome> {
        self.last_outcome.as_ref()
    }

    /// Sample local input for this tick. Returns the INPUT_FRAME to send,
    /// or `None` before the handshake completed.
    pub fn next_input(&mut self, movement: Vec3, aim: Vec3, flags: u32) -> Option<Message> {
        if self.status != SessionStatus::Active {
            return None;
        }
        let predictor = self.predictor.as_mut()?;
        Some(Message::InputFrame(
            predictor.apply_local_input(movement, aim, flags),
        ))
    }

    /// Chunk request for `chunk` with the locally known version.
    pub fn request_chunk(&self, chunk: [i32; 3]) -> Message {
        Message::ChunkRequest(self.chunks.request(chunk))
    }

    /// Chunk requests queued by terraform notifications.
    pub fn take_chunk_requests(&mut self) -> Vec<Message> {
        self.pending_chunk_requests
            .drain(..)
            .map(Message::ChunkRequest)
            .collect()
    }

    /// Per-frame update: decays the correction offset.
    pub fn update(&mut self, dt: f32) {
        self.smoothing.update(dt);
    }

    /// Where to draw the local player.
    pub fn render_position(&self) -> Option<Vec3> {
        self.predictor
            .as_ref()
            .map(|p| p.state().position + self.smoothing.offset())
    }

    /// Apply one server message received at local time `now` (seconds).
    pub fn handle_message(&mut self, message: &Message, now: f64) -> Result<(), ClientError> {
        match message {
            Message::HandshakeResponse(resp) => self.on_handshake(resp),
            Message::StateSnapshot(snapshot) => {
                self.on_snapshot(snapshot, now);
                Ok(())
            }
            Message::EntitySpawn(spawn) => {
                self.on_entity(&spawn.state, now);
                Ok(())
            }
            Message::EntityDespawn(despawn) => {
                self.remotes.remove(despawn.id);
                Ok(())
            }
            Message::ChunkData(data) => {
                self.chunks.insert(data)?;
                Ok(())
            }
            Message::TerraformApplied(applied) => {
                let stale = self.chunks.stale_after(applied);
                self.pending_chunk_requests.extend(stale);
                Ok(())
            }
            Message::Error(err) => {
                warn!(code = ?err.code, message = %err.message, "Server reported an error");
                Ok(())
            }
            other => {
                debug!(kind = ?other.message_type(), "Unhandled message");
                Ok(())
            }
        }
    }

    fn on_handshake(&mut self, resp: &HandshakeResponse) -> Result<(), ClientError> {
        if !resp.success {
            let reason = resp.error.clone().unwrap_or_default();
            self.status = SessionStatus::Rejected(reason.clone());
            return Err(ClientError::Rejected(reason));
        }
        if resp.protocol_version != PROTOCOL_VERSION {
            self.status = SessionStatus::Rejected("protocol mismatch".into());
            return Err(ClientError::ProtocolMismatch {
                server: resp.protocol_version,
                client: PROTOCOL_VERSION,
            });
        }

        let params = resp.motion.unwrap_or_default();
        self.tick_rate = resp.tick_rate;
        self.ticks = TickTracker::new(u64::from(resp.tick_rate / resp.snapshot_rate.max(1)));
        self.entity_id = resp.entity_id;
        self.predictor = Some(ClientPredictor::new(
            params,
            resp.tick_rate,
            MotionState::at(Vec3::ZERO),
        ));
        self.status = SessionStatus::Active;
        info!(client_id = %self.client_id, entity = ?resp.entity_id, tick = resp.tick, "Joined server");
        Ok(())
    }

    fn on_snapshot(&mut self, snapshot: &StateSnapshot, now: f64) {
        if !self.ticks.observe(snapshot.tick) {
            debug!(tick = snapshot.tick, "Dropping stale snapshot");
            return;
        }
        for state in &snapshot.entities {
            if Some(state.id) != self.entity_id {
                self.remotes.push(now, state);
            }
        }
        if let (Some(ack), Some(predictor)) = (&snapshot.player, self.predictor.as_mut()) {
            let outcome = reconcile(predictor, ack, &self.reconcile);
            self.smoothing.apply(&outcome);
            if let ReconcileOutcome::Snapped { error, .. } = outcome {
                debug!(error, "Prediction snapped to server state");
            }
            self.last_outcome = Some(outcome);
        }
    }

    fn on_entity(&mut self, state: &EntityState, now: f64) {
        if Some(state.id) == self.entity_id {
            if let Some(predictor) = self.predictor.as_mut() {
                predictor.reset(MotionState {
                    position: state.p,
                    velocity: state.v,
                    grounded: state.p.y <= 0.0,
                });
            }
        } else {
            self.remotes.push(now, state);
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
