//! Wire message schema.
//!
//! Every message is a JSON object carrying an integer `type` discriminator
//! next to the payload fields. [`Message`] is the sum of all payloads; the
//! codec in [`crate::codec`] adds and strips the discriminator.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::kinematics::MotionParams;
use crate::vector::vec3;

/// Current wire-protocol version, exchanged during the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Discriminators
// ---------------------------------------------------------------------------

/// Integer `type` discriminator of every wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    // --- Client -> server ---
    Handshake = 1,
    InputFrame = 2,
    TerraformRequest = 3,
    ChunkRequest = 4,
    Ping = 5,
    Disconnect = 6,
    SpellCastRequest = 7,

    // --- Server -> client ---
    HandshakeResponse = 100,
    StateSnapshot = 101,
    EntitySpawn = 102,
    EntityDespawn = 103,
    ProjectileHit = 104,
    NpcEvent = 105,
    TerraformApplied = 106,
    ChunkData = 107,
    Pong = 108,
    Error = 109,
    PlayerJoined = 110,
    PlayerLeft = 111,
    SpellCastEvent = 112,
}

impl MessageType {
    /// Returns `true` for types a client is allowed to send.
    pub fn is_client_to_server(self) -> bool {
        (self as u16) < 100
    }
}

impl TryFrom<u16> for MessageType {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, u16> {
        Ok(match raw {
            1 => Self::Handshake,
            2 => Self::InputFrame,
            3 => Self::TerraformRequest,
            4 => Self::ChunkRequest,
            5 => Self::Ping,
            6 => Self::Disconnect,
            7 => Self::SpellCastRequest,
            100 => Self::HandshakeResponse,
            101 => Self::StateSnapshot,
            102 => Self::EntitySpawn,
            103 => Self::EntityDespawn,
            104 => Self::ProjectileHit,
            105 => Self::NpcEvent,
            106 => Self::TerraformApplied,
            107 => Self::ChunkData,
            108 => Self::Pong,
            109 => Self::Error,
            110 => Self::PlayerJoined,
            111 => Self::PlayerLeft,
            112 => Self::SpellCastEvent,
            other => return Err(other),
        })
    }
}

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// Every message that crosses the wire, in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Handshake(Handshake),
    InputFrame(InputFrame),
    TerraformRequest(TerraformRequest),
    ChunkRequest(ChunkRequest),
    Ping(Ping),
    Disconnect(Disconnect),
    SpellCastRequest(SpellCastRequest),

    HandshakeResponse(HandshakeResponse),
    StateSnapshot(StateSnapshot),
    EntitySpawn(EntitySpawn),
    EntityDespawn(EntityDespawn),
    ProjectileHit(ProjectileHit),
    NpcEvent(NpcEvent),
    TerraformApplied(TerraformApplied),
    ChunkData(ChunkData),
    Pong(Pong),
    Error(ErrorMessage),
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    SpellCastEvent(SpellCastEvent),
}

impl Message {
    /// The discriminator this message is encoded with.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Handshake(_) => MessageType::Handshake,
            Message::InputFrame(_) => MessageType::InputFrame,
            Message::TerraformRequest(_) => MessageType::TerraformRequest,
            Message::ChunkRequest(_) => MessageType::ChunkRequest,
            Message::Ping(_) => MessageType::Ping,
            Message::Disconnect(_) => MessageType::Disconnect,
            Message::SpellCastRequest(_) => MessageType::SpellCastRequest,
            Message::HandshakeResponse(_) => MessageType::HandshakeResponse,
            Message::StateSnapshot(_) => MessageType::StateSnapshot,
            Message::EntitySpawn(_) => MessageType::EntitySpawn,
            Message::EntityDespawn(_) => MessageType::EntityDespawn,
            Message::ProjectileHit(_) => MessageType::ProjectileHit,
            Message::NpcEvent(_) => MessageType::NpcEvent,
            Message::TerraformApplied(_) => MessageType::TerraformApplied,
            Message::ChunkData(_) => MessageType::ChunkData,
            Message::Pong(_) => MessageType::Pong,
            Message::Error(_) => MessageType::Error,
            Message::PlayerJoined(_) => MessageType::PlayerJoined,
            Message::PlayerLeft(_) => MessageType::PlayerLeft,
            Message::SpellCastEvent(_) => MessageType::SpellCastEvent,
        }
    }

    /// Shorthand for an [`ErrorMessage`].
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Error(ErrorMessage {
            code,
            message: message.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Shared field types
// ---------------------------------------------------------------------------

/// Entity category. Serialized as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EntityKind {
    Player,
    Npc,
    Projectile,
    Prop,
}

impl From<EntityKind> for u8 {
    fn from(kind: EntityKind) -> u8 {
        match kind {
            EntityKind::Player => 0,
            EntityKind::Npc => 1,
            EntityKind::Projectile => 2,
            EntityKind::Prop => 3,
        }
    }
}

impl TryFrom<u8> for EntityKind {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, String> {
        match raw {
            0 => Ok(EntityKind::Player),
            1 => Ok(EntityKind::Npc),
            2 => Ok(EntityKind::Projectile),
            3 => Ok(EntityKind::Prop),
            other => Err(format!("unknown entity kind {other}")),
        }
    }
}

/// Terraform operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerraformKind {
    /// Fill the sphere with a material.
    SphereAdd,
    /// Clear the sphere to empty.
    SphereSub,
    /// Recolour only non-empty voxels inside the sphere.
    Paint,
}

/// Chunk coordinate as sent on the wire.
pub type ChunkCoord = [i32; 3];

/// Bit flags carried by [`InputFrame::flags`].
pub mod action_flags {
    /// Jump when grounded.
    pub const JUMP: u32 = 1 << 0;
}

/// Error categories reported in [`ErrorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The message could not be parsed.
    Malformed,
    /// The peer has not completed the handshake.
    NotAuthenticated,
    /// The session token was rejected.
    AuthFailed,
    /// The client speaks a different protocol version.
    VersionMismatch,
    /// The request was well-formed but not acceptable.
    Rejected,
}

// ---------------------------------------------------------------------------
// Client -> server payloads
// ---------------------------------------------------------------------------

/// First message on a connection: presents the control-plane credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Token issued by the auth service.
    pub session_token: String,
    /// Client identifier the token was issued for.
    pub client_id: String,
    /// Protocol version the client speaks.
    pub protocol_version: u32,
}

/// One tick of player input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Client-side tick the input was sampled on.
    pub tick: u64,
    /// Monotonic per-client sequence id.
    pub seq: u32,
    /// Desired movement direction (x/z plane, length <= 1).
    #[serde(rename = "move", with = "vec3")]
    pub movement: Vec3,
    /// Aim direction.
    #[serde(with = "vec3")]
    pub aim: Vec3,
    /// Action bits, see [`action_flags`].
    #[serde(default)]
    pub flags: u32,
}

/// Request to modify terrain around a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerraformRequest {
    /// Operation kind.
    pub op: TerraformKind,
    /// Sphere centre in world space.
    #[serde(with = "vec3")]
    pub center: Vec3,
    /// Sphere radius in voxels.
    pub radius: f32,
    /// Material id to write (ignored for `SphereSub`).
    #[serde(default)]
    pub material: u16,
}

/// Pull request for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRequest {
    /// Chunk coordinate.
    pub chunk: ChunkCoord,
    /// Version the client already holds (0 if none).
    #[serde(default)]
    pub known_version: u32,
}

/// Latency probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    /// Client timestamp in milliseconds, echoed back.
    pub client_time: f64,
}

/// Voluntary disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disconnect {
    /// Optional human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Request to execute a spell from the spell book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellCastRequest {
    /// Spell book key.
    pub spell_id: String,
    /// Cast direction.
    #[serde(with = "vec3")]
    pub direction: Vec3,
}

// ---------------------------------------------------------------------------
// Server -> client payloads
// ---------------------------------------------------------------------------

/// Handshake result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Whether the client was admitted.
    pub success: bool,
    /// Echo of the client id.
    pub client_id: String,
    /// Entity the client controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<u64>,
    /// Server tick at admission.
    pub tick: u64,
    /// Simulation tick rate (Hz).
    pub tick_rate: u32,
    /// Snapshot broadcast rate (Hz).
    pub snapshot_rate: u32,
    /// Server protocol version.
    pub protocol_version: u32,
    /// Movement parameters for client prediction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionParams>,
    /// Reason for rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compact per-entity state inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity id.
    pub id: u64,
    /// Entity kind.
    pub t: EntityKind,
    /// Position.
    #[serde(with = "vec3")]
    pub p: Vec3,
    /// Rotation (Euler radians: pitch, yaw, roll).
    #[serde(with = "vec3")]
    pub r: Vec3,
    /// Velocity.
    #[serde(with = "vec3")]
    pub v: Vec3,
    /// Health.
    pub h: f32,
}

/// Reconciliation data for the receiving client's own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAck {
    /// Last input sequence id the server processed for this client.
    pub seq: u32,
    /// Authoritative position.
    #[serde(with = "vec3")]
    pub p: Vec3,
    /// Authoritative velocity.
    #[serde(with = "vec3")]
    pub v: Vec3,
    /// Grounded flag.
    pub g: bool,
}

/// Periodic state broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Server tick the snapshot was taken on.
    pub tick: u64,
    /// All live entities.
    pub entities: Vec<EntityState>,
    /// The receiver's own reconciliation data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerAck>,
}

/// A new entity became live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpawn {
    /// Initial state.
    #[serde(flatten)]
    pub state: EntityState,
    /// Owning entity, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<u64>,
}

/// An entity was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDespawn {
    /// Removed entity id.
    pub id: u64,
}

/// Projectile impact verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileHit {
    /// Projectile that hit.
    pub projectile_id: u64,
    /// Entity struck, or `None` for terrain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_entity_id: Option<u64>,
    /// World-space impact point.
    #[serde(with = "vec3")]
    pub hit_point: Vec3,
    /// Surface normal at the impact.
    #[serde(with = "vec3")]
    pub hit_normal: Vec3,
    /// Damage carried by the projectile.
    pub damage: f32,
    /// Tick of the impact.
    pub tick: u64,
}

/// NPC perception transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcEventKind {
    /// Crossed the suspicious threshold (either direction).
    SuspicionChanged,
    /// Crossed the spotted threshold upward; a target is set.
    Spotted,
    /// Fell back below the suspicious threshold while spotted.
    Lost,
}

/// Detection state of an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    #[default]
    Idle,
    Suspicious,
    Spotted,
}

/// NPC perception event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcEvent {
    /// NPC entity id.
    pub npc_id: u64,
    /// Transition kind.
    pub event: NpcEventKind,
    /// State after the transition.
    pub state: DetectionState,
    /// Current target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<u64>,
    /// Suspicion level after the pass.
    pub suspicion: f32,
    /// Tick of the perception pass.
    pub tick: u64,
}

/// New version of one chunk after a terraform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkVersion {
    /// Chunk coordinate.
    pub chunk: ChunkCoord,
    /// Version after the edit.
    pub version: u32,
}

/// Broadcast after a terraform changed at least one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerraformApplied {
    /// Operation kind.
    pub op: TerraformKind,
    /// Sphere centre.
    #[serde(with = "vec3")]
    pub center: Vec3,
    /// Sphere radius.
    pub radius: f32,
    /// Material written.
    pub material: u16,
    /// Changed chunks with their new versions.
    pub chunks: Vec<ChunkVersion>,
    /// Tick the edit was applied on.
    pub tick: u64,
}

/// Chunk payload answering a [`ChunkRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    /// Chunk coordinate.
    pub chunk: ChunkCoord,
    /// Server version of the payload.
    pub version: u32,
    /// Whether `data` is compressed.
    pub compressed: bool,
    /// Base64 voxel bytes.
    pub data: String,
}

impl ChunkData {
    /// Build a payload from raw (possibly compressed) voxel bytes.
    pub fn from_bytes(chunk: ChunkCoord, version: u32, compressed: bool, bytes: &[u8]) -> Self {
        use base64::Engine;
        Self {
            chunk,
            version,
            compressed,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Decode the base64 `data` field.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}

/// Answer to [`Ping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    /// Echoed client timestamp.
    pub client_time: f64,
    /// Current server tick.
    pub server_tick: u64,
}

/// Error report for a rejected or malformed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

/// A client completed the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub client_id: String,
    pub entity_id: u64,
}

/// A client's session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub client_id: String,
    pub entity_id: u64,
}

/// A spell was executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellCastEvent {
    /// Casting entity.
    pub caster_id: u64,
    /// Spell book key.
    pub spell_id: String,
    /// Cast origin.
    #[serde(with = "vec3")]
    pub origin: Vec3,
    /// Cast direction.
    #[serde(with = "vec3")]
    pub direction: Vec3,
    /// Projectile spawned by the cast, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projectile_id: Option<u64>,
    /// Tick of execution.
    pub tick: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminators_match_wire_table() {
        assert_eq!(MessageType::Handshake as u16, 1);
        assert_eq!(MessageType::SpellCastRequest as u16, 7);
        assert_eq!(MessageType::HandshakeResponse as u16, 100);
        assert_eq!(MessageType::ChunkData as u16, 107);
        assert_eq!(MessageType::SpellCastEvent as u16, 112);
    }

    #[test]
    fn test_discriminator_try_from_covers_every_type() {
        for raw in (1..=7).chain(100..=112) {
            let ty = MessageType::try_from(raw).unwrap();
            assert_eq!(ty as u16, raw);
        }
        assert_eq!(MessageType::try_from(0), Err(0));
        assert_eq!(MessageType::try_from(99), Err(99));
        assert_eq!(MessageType::try_from(113), Err(113));
    }

    #[test]
    fn test_direction_split() {
        assert!(MessageType::Ping.is_client_to_server());
        assert!(!MessageType::Pong.is_client_to_server());
    }

    #[test]
    fn test_entity_kind_is_integer_on_wire() {
        let json = serde_json::to_string(&EntityKind::Projectile).unwrap();
        assert_eq!(json, "2");
        let back: EntityKind = serde_json::from_str("1").unwrap();
        assert_eq!(back, EntityKind::Npc);
        assert!(serde_json::from_str::<EntityKind>("9").is_err());
    }

    #[test]
    fn test_chunk_data_base64() {
        let data = ChunkData::from_bytes([0, 0, 0], 1, false, &[0, 1, 2]);
        assert_eq!(data.data, "AAEC");
        assert_eq!(data.bytes().unwrap(), vec![0, 1, 2]);

        let bad = ChunkData {
            data: "***".into(),
            ..data
        };
        assert!(bad.bytes().is_err());
    }

    #[test]
    fn test_snapshot_uses_short_keys() {
        let snap = StateSnapshot {
            tick: 3,
            entities: vec![EntityState {
                id: 7,
                t: EntityKind::Player,
                p: Vec3::ZERO,
                r: Vec3::ZERO,
                v: Vec3::ZERO,
                h: 100.0,
            }],
            player: Some(PlayerAck {
                seq: 2,
                p: Vec3::ZERO,
                v: Vec3::ZERO,
                g: true,
            }),
        };
        let value = serde_json::to_value(&snap).unwrap();
        let entity = &value["entities"][0];
        for key in ["id", "t", "p", "r", "v", "h"] {
            assert!(entity.get(key).is_some(), "missing key {key}");
        }
        for key in ["seq", "p", "v", "g"] {
            assert!(value["player"].get(key).is_some(), "missing key {key}");
        }
    }
}
