//! The authoritative simulation.
//!
//! [`Simulation`] owns every piece of world state and is driven from one
//! thread: [`handle_event`](Simulation::handle_event) between ticks for
//! inbound traffic, [`step`](Simulation::step) once per fixed tick. A step
//! runs, in order:
//!
//! 1. reap disconnected sessions (despawn their players)
//! 2. input: one buffered frame (or neutral input) per player, then queued
//!    terraforms and spell casts
//! 3. projectiles
//! 4. NPC perception, every `perception_interval_ticks`
//! 5. tick counter increment, then a snapshot every N ticks
//!
//! Input, projectile and perception phases plan first and commit second.
//! A fault while planning skips that phase for the tick; an inconsistency
//! found while committing is fatal.

use std::panic::{self, AssertUnwindSafe};

use glam::Vec3;
use strata_config::Config;
use strata_protocol::{
    ChunkVersion, EntityDespawn, EntityKind, EntitySpawn, ErrorCode, Handshake, HandshakeResponse,
    InboundEvent, InputFrame, Message, MessageSink, MotionInput, MotionParams, MotionState,
    PROTOCOL_VERSION, PeerId, PlayerAck, PlayerJoined, PlayerLeft, Pong, SpellCastEvent,
    SpellCastRequest, StateSnapshot, TerraformApplied, step_motion,
};
use strata_voxel::{ChunkId, ChunkStore, TerraformLimits, TerraformOp};
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, SessionValidator};
use crate::entity::{Entity, EntityId, EntityInit, yaw_from_direction};
use crate::error::{SimError, SubsystemFault};
use crate::input::InputBuffer;
use crate::perception::{PerceptionParams, PerceptionSystem};
use crate::persistence::{SavedChunk, WorldSave};
use crate::projectile::{ProjectileError, ProjectileParams, ProjectileSystem};
use crate::registry::{EntityRegistry, RegistryError};
use crate::session::{ConnectionState, SessionTable};
use crate::spells::{SpellBook, SpellEffect};

// ---------------------------------------------------------------------------
// Settings and reports
// ---------------------------------------------------------------------------

/// Tick-invariant settings derived from [`Config`].
#[derive(Debug, Clone)]
struct SimSettings {
    tick_rate: u32,
    snapshot_rate: u32,
    snapshot_interval: u64,
    perception_interval: u64,
    dt: f32,
    motion: MotionParams,
    eye_height: f32,
    player_health: f32,
    spawn_point: Vec3,
    max_protocol_errors: u32,
}

impl SimSettings {
    fn from_config(config: &Config) -> Self {
        let tick_rate = config.simulation.tick_rate.max(1);
        Self {
            tick_rate,
            snapshot_rate: config.simulation.snapshot_rate,
            snapshot_interval: u64::from(config.snapshot_interval_ticks().max(1)),
            perception_interval: u64::from(config.simulation.perception_interval_ticks.max(1)),
            dt: 1.0 / tick_rate as f32,
            motion: MotionParams {
                walk_speed: config.movement.walk_speed,
                gravity: config.movement.gravity,
                jump_speed: config.movement.jump_speed,
            },
            eye_height: config.movement.eye_height,
            player_health: config.movement.player_health,
            spawn_point: Vec3::from_array(config.simulation.spawn_point),
            max_protocol_errors: config.server.max_protocol_errors.max(1),
        }
    }
}

/// Subsystem phases that are isolated from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Input,
    Projectiles,
    Perception,
}

/// What one [`Simulation::step`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Tick number after the step.
    pub tick: u64,
    /// Buffered input frames consumed.
    pub inputs_consumed: usize,
    pub projectile_hits: usize,
    pub npc_events: usize,
    pub perception_ran: bool,
    pub snapshot_sent: bool,
    /// Phases skipped this tick.
    pub faults: Vec<(Phase, SubsystemFault)>,
}

#[derive(Debug, Clone)]
struct QueuedTerraform {
    peer: PeerId,
    op: TerraformOp,
}

#[derive(Debug, Clone)]
struct QueuedCast {
    peer: PeerId,
    request: SpellCastRequest,
}

/// Planned movement of one player.
#[derive(Debug, Clone)]
struct PlannedMove {
    peer: PeerId,
    entity: EntityId,
    state: MotionState,
    yaw: Option<f32>,
    consumes_frame: bool,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// All authoritative world state plus the session bookkeeping around it.
pub struct Simulation {
    settings: SimSettings,
    tick: u64,
    registry: EntityRegistry,
    terrain: ChunkStore,
    inputs: InputBuffer,
    sessions: SessionTable,
    projectiles: ProjectileSystem,
    perception: PerceptionSystem,
    spells: SpellBook,
    validator: Box<dyn SessionValidator>,
    pending_terraforms: Vec<QueuedTerraform>,
    pending_casts: Vec<QueuedCast>,
}

impl Simulation {
    pub fn new(config: &Config, validator: Box<dyn SessionValidator>) -> Self {
        let limits = TerraformLimits {
            max_radius: config.terrain.max_radius,
            max_material: config.terrain.max_material,
        };
        Self {
            settings: SimSettings::from_config(config),
            tick: 0,
            registry: EntityRegistry::new(),
            terrain: ChunkStore::new(limits),
            inputs: InputBuffer::new(config.simulation.input_queue_capacity),
            sessions: SessionTable::new(),
            projectiles: ProjectileSystem::new(ProjectileParams::from(&config.projectile)),
            perception: PerceptionSystem::new(PerceptionParams::from_config(
                &config.perception,
                config.projectile.target_radius,
            )),
            spells: SpellBook::from(&config.spells),
            validator,
            pending_terraforms: Vec::new(),
            pending_casts: Vec::new(),
        }
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f32 {
        self.settings.dt
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn terrain(&self) -> &ChunkStore {
        &self.terrain
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn inputs(&self) -> &InputBuffer {
        &self.inputs
    }

    pub fn perception(&self) -> &PerceptionSystem {
        &self.perception
    }

    pub fn projectiles(&self) -> &ProjectileSystem {
        &self.projectiles
    }

    // -- World setup ---------------------------------------------------------

    /// Place an NPC facing `yaw`.
    pub fn spawn_npc(&mut self, position: Vec3, yaw: f32) -> EntityId {
        self.registry
            .register(EntityKind::Npc, EntityInit::at(position).with_yaw(yaw))
    }

    /// Place a static prop. Props block NPC line of sight.
    pub fn spawn_prop(&mut self, position: Vec3) -> EntityId {
        self.registry.register(EntityKind::Prop, EntityInit::at(position))
    }

    /// Launch a projectile outside of a spell cast.
    pub fn spawn_projectile(
        &mut self,
        owner: Option<EntityId>,
        origin: Vec3,
        direction: Vec3,
        speed: f32,
        ttl_ticks: u32,
        damage: f32,
    ) -> Result<EntityId, ProjectileError> {
        self.projectiles.spawn(
            &mut self.registry,
            owner,
            origin,
            direction,
            speed,
            ttl_ticks,
            damage,
            self.tick,
        )
    }

    /// Apply a terraform immediately, outside of any client request.
    pub fn apply_terraform(
        &mut self,
        op: &TerraformOp,
    ) -> Result<Vec<(ChunkId, u32)>, strata_voxel::TerraformError> {
        self.terrain.apply_terraform(op)
    }

    // -- Inbound traffic -----------------------------------------------------

    /// Handle one transport event. Runs between ticks on the simulation
    /// thread.
    pub fn handle_event(&mut self, event: InboundEvent, sink: &mut dyn MessageSink) {
        match event {
            InboundEvent::Connected(peer) => self.sessions.connect(peer),
            InboundEvent::Disconnected(peer) => {
                self.sessions.mark_disconnected(peer);
            }
            InboundEvent::Malformed(peer, reason) => {
                self.sessions.connect(peer);
                self.protocol_error(peer, &reason, sink);
            }
            InboundEvent::Message(peer, message) => self.handle_message(peer, message, sink),
        }
    }

    fn handle_message(&mut self, peer: PeerId, message: Message, sink: &mut dyn MessageSink) {
        match self.sessions.state(peer) {
            None => self.sessions.connect(peer),
            Some(ConnectionState::Disconnected) => {
                debug!(%peer, "Ignoring message from disconnected peer");
                return;
            }
            Some(_) => {}
        }

        let ty = message.message_type();
        if !ty.is_client_to_server() {
            self.protocol_error(peer, &format!("unexpected message type {}", ty as u16), sink);
            return;
        }

        let authenticated = self.sessions.state(peer) == Some(ConnectionState::Authenticated);
        match message {
            Message::Handshake(handshake) => self.handle_handshake(peer, handshake, sink),
            Message::Ping(ping) => sink.send(
                peer,
                Message::Pong(Pong {
                    client_time: ping.client_time,
                    server_tick: self.tick,
                }),
            ),
            _ if !authenticated => {
                debug!(%peer, ?ty, "Rejected message before handshake");
                sink.send(
                    peer,
                    Message::error(ErrorCode::NotAuthenticated, "handshake required"),
                );
            }
            Message::InputFrame(frame) => self.submit_input(peer, frame),
            Message::TerraformRequest(request) => {
                let op = TerraformOp::from(&request);
                match op.validate(self.terrain.limits()) {
                    Ok(_) => self.pending_terraforms.push(QueuedTerraform { peer, op }),
                    Err(e) => {
                        warn!(%peer, error = %e, "Rejected terraform request");
                        sink.send(peer, Message::error(ErrorCode::Rejected, e.to_string()));
                    }
                }
            }
            Message::ChunkRequest(request) => {
                let id = ChunkId::from(request.chunk);
                if let Some(payload) = self.terrain.serve_if_newer(id, request.known_version) {
                    sink.send(peer, Message::ChunkData(payload.to_message()));
                }
            }
            Message::SpellCastRequest(request) => {
                if !self.spells.contains(&request.spell_id) {
                    warn!(%peer, spell = %request.spell_id, "Unknown spell");
                    sink.send(
                        peer,
                        Message::error(
                            ErrorCode::Rejected,
                            format!("unknown spell '{}'", request.spell_id),
                        ),
                    );
                } else if request.direction.try_normalize().is_none() {
                    sink.send(
                        peer,
                        Message::error(ErrorCode::Rejected, "invalid cast direction"),
                    );
                } else {
                    self.pending_casts.push(QueuedCast { peer, request });
                }
            }
            Message::Disconnect(disconnect) => {
                info!(%peer, reason = ?disconnect.reason, "Client disconnected");
                self.sessions.mark_disconnected(peer);
                sink.disconnect(peer);
            }
            // Server-to-client types were filtered above.
            _ => {}
        }
    }

    fn submit_input(&mut self, peer: PeerId, frame: InputFrame) {
        self.inputs.submit(peer, frame);
    }

    fn protocol_error(&mut self, peer: PeerId, reason: &str, sink: &mut dyn MessageSink) {
        let count = self.sessions.record_protocol_error(peer);
        debug!(%peer, count, reason, "Protocol error");
        sink.send(peer, Message::error(ErrorCode::Malformed, reason));
        if count >= self.settings.max_protocol_errors {
            warn!(%peer, count, "Too many protocol errors, dropping connection");
            self.sessions.mark_disconnected(peer);
            sink.disconnect(peer);
        }
    }

    fn handle_handshake(&mut self, peer: PeerId, handshake: Handshake, sink: &mut dyn MessageSink) {
        let result = if handshake.protocol_version != PROTOCOL_VERSION {
            Err(AuthError::VersionMismatch {
                client: handshake.protocol_version,
                server: PROTOCOL_VERSION,
            })
        } else {
            self.sessions
                .can_authenticate(peer, &handshake.client_id)
                .and_then(|()| {
                    self.validator
                        .validate(&handshake.session_token, &handshake.client_id)
                })
        };

        if let Err(e) = result {
            warn!(%peer, client_id = %handshake.client_id, error = %e, "Handshake rejected");
            sink.send(
                peer,
                Message::HandshakeResponse(HandshakeResponse {
                    success: false,
                    client_id: handshake.client_id,
                    entity_id: None,
                    tick: self.tick,
                    tick_rate: self.settings.tick_rate,
                    snapshot_rate: self.settings.snapshot_rate,
                    protocol_version: PROTOCOL_VERSION,
                    motion: None,
                    error: Some(e.to_string()),
                }),
            );
            return;
        }

        let entity_id = self.registry.register(
            EntityKind::Player,
            EntityInit::at(self.settings.spawn_point).with_health(self.settings.player_health),
        );
        self.sessions
            .authenticate(peer, &handshake.client_id, entity_id);

        sink.send(
            peer,
            Message::HandshakeResponse(HandshakeResponse {
                success: true,
                client_id: handshake.client_id.clone(),
                entity_id: Some(entity_id),
                tick: self.tick,
                tick_rate: self.settings.tick_rate,
                snapshot_rate: self.settings.snapshot_rate,
                protocol_version: PROTOCOL_VERSION,
                motion: Some(self.settings.motion),
                error: None,
            }),
        );
        for existing in self.registry.sorted() {
            if existing.id != entity_id {
                sink.send(peer, spawn_message(existing));
            }
        }

        self.broadcast(
            sink,
            Message::PlayerJoined(PlayerJoined {
                client_id: handshake.client_id,
                entity_id,
            }),
        );
        if let Some(player) = self.registry.get(entity_id) {
            let spawn = spawn_message(player);
            self.broadcast(sink, spawn);
        }
    }

    fn broadcast(&self, sink: &mut dyn MessageSink, message: Message) {
        let peers = self.sessions.authenticated_peers();
        if !peers.is_empty() {
            sink.broadcast(&peers, message);
        }
    }

    // -- Tick ----------------------------------------------------------------

    /// Run one fixed tick.
    ///
    /// Returns [`SimError::Fatal`] if shared state became inconsistent; the
    /// caller must stop ticking.
    pub fn step(&mut self, sink: &mut dyn MessageSink) -> Result<StepReport, SimError> {
        let mut report = StepReport::default();

        self.reap_sessions(sink)?;

        // (1) Input.
        match isolate(|| self.plan_input()) {
            Ok(moves) => report.inputs_consumed = self.commit_input(moves)?,
            Err(fault) => self.record_fault(&mut report, Phase::Input, fault),
        }
        self.run_terraforms(sink);
        self.run_casts(sink);

        // (2) Projectiles.
        let planned = isolate(|| {
            self.projectiles
                .plan(&self.registry, &self.terrain, self.tick, self.settings.dt)
        });
        match planned {
            Ok(plan) => {
                let outcome = self.projectiles.commit(plan, &mut self.registry, self.tick)?;
                report.projectile_hits = outcome.hits.len();
                for hit in outcome.hits {
                    self.broadcast(sink, Message::ProjectileHit(hit));
                }
                for id in outcome.despawned {
                    self.broadcast(sink, Message::EntityDespawn(EntityDespawn { id }));
                }
            }
            Err(fault) => self.record_fault(&mut report, Phase::Projectiles, fault),
        }

        // (3) Perception on its sub-interval.
        if self.tick % self.settings.perception_interval == 0 {
            report.perception_ran = true;
            let elapsed = self.settings.perception_interval as f32 * self.settings.dt;
            let planned =
                isolate(|| self.perception.plan(&self.registry, &self.terrain, elapsed, self.tick));
            match planned {
                Ok(plan) => {
                    let events = self.perception.commit(plan);
                    report.npc_events = events.len();
                    for event in events {
                        self.broadcast(sink, Message::NpcEvent(event));
                    }
                }
                Err(fault) => self.record_fault(&mut report, Phase::Perception, fault),
            }
        }

        if let Err(e) = self.registry.check_invariants() {
            error!(tick = self.tick, error = %e, "Entity registry invariant violated");
            return Err(SimError::Fatal(e));
        }

        // (4) Advance.
        self.tick += 1;
        report.tick = self.tick;

        if self.tick % self.settings.snapshot_interval == 0 {
            self.send_snapshots(sink);
            report.snapshot_sent = true;
        }
        Ok(report)
    }

    fn record_fault(&self, report: &mut StepReport, phase: Phase, fault: SubsystemFault) {
        warn!(tick = self.tick, ?phase, error = %fault, "Subsystem fault, phase skipped");
        report.faults.push((phase, fault));
    }

    fn reap_sessions(&mut self, sink: &mut dyn MessageSink) -> Result<(), SimError> {
        for session in self.sessions.reap_disconnected() {
            self.inputs.remove(session.peer);
            self.pending_terraforms.retain(|q| q.peer != session.peer);
            self.pending_casts.retain(|q| q.peer != session.peer);
            let Some(entity_id) = session.entity_id else {
                continue;
            };
            self.registry
                .deregister(entity_id)
                .ok_or(RegistryError::Missing(entity_id))?;
            info!(peer = %session.peer, entity_id, "Player despawned");
            self.broadcast(sink, Message::EntityDespawn(EntityDespawn { id: entity_id }));
            if let Some(client_id) = session.client_id {
                self.broadcast(
                    sink,
                    Message::PlayerLeft(PlayerLeft {
                        client_id,
                        entity_id,
                    }),
                );
            }
        }
        self.perception.retain_live(&self.registry);
        Ok(())
    }

    fn plan_input(&self) -> Result<Vec<PlannedMove>, SubsystemFault> {
        let mut moves = Vec::new();
        for session in self.sessions.authenticated() {
            let Some(entity_id) = session.entity_id else {
                continue;
            };
            let Some(entity) = self.registry.get(entity_id) else {
                continue;
            };
            if !entity.position.is_finite() {
                return Err(SubsystemFault::NonFinitePosition(entity_id));
            }
            let frame = self.inputs.peek_next(session.peer);
            let input = frame.map_or(MotionInput::NEUTRAL, MotionInput::from);
            let current = MotionState {
                position: entity.position,
                velocity: entity.velocity,
                grounded: entity.position.y <= 0.0,
            };
            moves.push(PlannedMove {
                peer: session.peer,
                entity: entity_id,
                state: step_motion(&current, &input, self.settings.dt, &self.settings.motion),
                yaw: frame.and_then(|f| yaw_from_direction(f.aim)),
                consumes_frame: frame.is_some(),
            });
        }
        Ok(moves)
    }

    fn commit_input(&mut self, moves: Vec<PlannedMove>) -> Result<usize, RegistryError> {
        let mut consumed = 0;
        for planned in moves {
            if planned.consumes_frame && self.inputs.consume_next(planned.peer).is_some() {
                consumed += 1;
            }
            let entity = self
                .registry
                .get_mut(planned.entity)
                .ok_or(RegistryError::Missing(planned.entity))?;
            entity.position = planned.state.position;
            entity.velocity = planned.state.velocity;
            if let Some(yaw) = planned.yaw {
                entity.rotation.y = yaw;
            }
        }
        Ok(consumed)
    }

    fn run_terraforms(&mut self, sink: &mut dyn MessageSink) {
        for queued in std::mem::take(&mut self.pending_terraforms) {
            match self.terrain.apply_terraform(&queued.op) {
                Ok(changed) => {
                    let applied = self.terraform_applied(&queued.op, &changed);
                    self.broadcast(sink, applied);
                }
                Err(e) => {
                    warn!(peer = %queued.peer, error = %e, "Terraform rejected");
                    sink.send(queued.peer, Message::error(ErrorCode::Rejected, e.to_string()));
                }
            }
        }
    }

    fn terraform_applied(&self, op: &TerraformOp, changed: &[(ChunkId, u32)]) -> Message {
        Message::TerraformApplied(TerraformApplied {
            op: op.kind,
            center: op.center,
            radius: op.radius,
            material: op.material,
            chunks: changed
                .iter()
                .map(|&(id, version)| ChunkVersion {
                    chunk: id.into(),
                    version,
                })
                .collect(),
            tick: self.tick,
        })
    }

    fn run_casts(&mut self, sink: &mut dyn MessageSink) {
        for QueuedCast { peer, request } in std::mem::take(&mut self.pending_casts) {
            let caster = self
                .sessions
                .get(peer)
                .filter(|s| s.state == ConnectionState::Authenticated)
                .and_then(|s| s.entity_id)
                .and_then(|id| self.registry.get(id));
            let Some(caster) = caster else {
                continue;
            };
            let caster_id = caster.id;
            let effect = match self.spells.resolve(
                &request.spell_id,
                caster,
                request.direction,
                self.settings.eye_height,
            ) {
                Ok(effect) => effect,
                Err(e) => {
                    sink.send(peer, Message::error(ErrorCode::Rejected, e.to_string()));
                    continue;
                }
            };

            let mut cast_event = SpellCastEvent {
                caster_id,
                spell_id: request.spell_id.clone(),
                origin: effect.origin(),
                direction: effect.direction(),
                projectile_id: None,
                tick: self.tick,
            };
            let follow_up = match effect {
                SpellEffect::Projectile {
                    origin,
                    direction,
                    speed,
                    ttl_ticks,
                    damage,
                } => self
                    .projectiles
                    .spawn(
                        &mut self.registry,
                        Some(caster_id),
                        origin,
                        direction,
                        speed,
                        ttl_ticks,
                        damage,
                        self.tick,
                    )
                    .map_err(|e| e.to_string())
                    .and_then(|id| {
                        cast_event.projectile_id = Some(id);
                        self.registry
                            .get(id)
                            .map(spawn_message)
                            .ok_or_else(|| format!("projectile {id} missing after spawn"))
                    }),
                SpellEffect::Terraform { op, .. } => self
                    .terrain
                    .apply_terraform(&op)
                    .map(|changed| self.terraform_applied(&op, &changed))
                    .map_err(|e| e.to_string()),
            };

            match follow_up {
                Ok(message) => {
                    debug!(%peer, caster_id, spell = %request.spell_id, "Spell cast");
                    self.broadcast(sink, Message::SpellCastEvent(cast_event));
                    self.broadcast(sink, message);
                }
                Err(reason) => {
                    warn!(%peer, spell = %request.spell_id, %reason, "Spell cast failed");
                    sink.send(peer, Message::error(ErrorCode::Rejected, reason));
                }
            }
        }
    }

    fn send_snapshots(&self, sink: &mut dyn MessageSink) {
        let entities: Vec<_> = self.registry.sorted().into_iter().map(Entity::to_state).collect();
        for session in self.sessions.authenticated() {
            let player = session
                .entity_id
                .and_then(|id| self.registry.get(id))
                .map(|e| PlayerAck {
                    seq: self.inputs.last_processed_sequence_id(session.peer),
                    p: e.position,
                    v: e.velocity,
                    g: e.position.y <= 0.0,
                });
            sink.send(
                session.peer,
                Message::StateSnapshot(StateSnapshot {
                    tick: self.tick,
                    entities: entities.clone(),
                    player,
                }),
            );
        }
    }

    // -- Persistence ---------------------------------------------------------

    /// Load a saved world. Call before any client connects.
    ///
    /// Players and in-flight projectiles are not part of a save and are
    /// skipped if present.
    pub fn restore(&mut self, save: WorldSave) -> Result<(), SimError> {
        for saved in &save.chunks {
            let chunk = saved.to_chunk()?;
            self.terrain.restore(saved.id, chunk);
        }
        for entity in save.entities {
            if matches!(entity.kind, EntityKind::Player | EntityKind::Projectile) {
                continue;
            }
            self.registry.restore(entity)?;
        }
        self.registry.reserve_ids_below(save.next_entity_id);
        self.tick = self.tick.max(save.tick);
        info!(
            tick = self.tick,
            entities = self.registry.len(),
            chunks = self.terrain.len(),
            "World restored"
        );
        Ok(())
    }

    /// Capture the world for the persistence service.
    pub fn export_save(&self) -> WorldSave {
        let entities = self
            .registry
            .sorted()
            .into_iter()
            .filter(|e| matches!(e.kind, EntityKind::Npc | EntityKind::Prop))
            .cloned()
            .collect();
        let chunks = self
            .terrain
            .iter_sorted()
            .into_iter()
            .map(|(id, chunk)| SavedChunk::from_chunk(id, chunk))
            .collect();
        WorldSave::new(self.tick, self.registry.next_id(), entities, chunks)
    }
}

fn spawn_message(entity: &Entity) -> Message {
    Message::EntitySpawn(EntitySpawn {
        state: entity.to_state(),
        owner: entity.owner,
    })
}

/// Run a planning closure, turning a panic into a [`SubsystemFault`].
fn isolate<T>(plan: impl FnOnce() -> Result<T, SubsystemFault>) -> Result<T, SubsystemFault> {
    match panic::catch_unwind(AssertUnwindSafe(plan)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(SubsystemFault::Panicked(message))
        }
    }
}

#[cfg(test)]
#[path = "simulation_tests.rs"]
mod tests;
