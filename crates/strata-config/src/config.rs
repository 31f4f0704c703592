//! Configuration structs with sensible defaults and RON persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_protocol::TerraformKind;

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and connection limits.
    pub server: ServerConfig,
    /// Tick loop settings.
    pub simulation: SimulationConfig,
    /// Player kinematics shared with clients.
    pub movement: MovementConfig,
    /// Terraform limits.
    pub terrain: TerrainConfig,
    /// Projectile limits.
    pub projectile: ProjectileConfig,
    /// NPC sensing.
    pub perception: PerceptionConfig,
    /// Handshake validation.
    pub auth: AuthConfig,
    /// Spell book.
    pub spells: SpellsConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener on.
    pub bind_address: String,
    /// Listener port.
    pub port: u16,
    /// Maximum simultaneous connections.
    pub max_connections: u32,
    /// Malformed messages tolerated before a peer is dropped.
    pub max_protocol_errors: u32,
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: u32,
}

/// Tick loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Snapshot broadcasts per second. Must divide `tick_rate`.
    pub snapshot_rate: u32,
    /// NPC perception runs every this many ticks.
    pub perception_interval_ticks: u32,
    /// Most catch-up steps executed for one wall-clock advance.
    pub max_steps_per_frame: u32,
    /// Accumulated time beyond this many seconds is dropped.
    pub max_accumulated_secs: f64,
    /// Buffered input frames kept per client.
    pub input_queue_capacity: usize,
    /// Where new players appear.
    pub spawn_point: [f32; 3],
}

/// Movement constants. Sent to clients in the handshake response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Horizontal speed at full input, units per second.
    pub walk_speed: f32,
    /// Downward acceleration, units per second squared.
    pub gravity: f32,
    /// Vertical speed of a jump.
    pub jump_speed: f32,
    /// Height of a player's eye above its position.
    pub eye_height: f32,
    /// Health of a freshly spawned player.
    pub player_health: f32,
}

/// Terraform limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Largest accepted sphere radius.
    pub max_radius: f32,
    /// Largest accepted material id.
    pub max_material: u8,
}

/// Projectile limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectileConfig {
    /// Collision radius of every targetable entity.
    pub target_radius: f32,
    /// Fastest projectile accepted.
    pub max_speed: f32,
    /// Longest projectile lifetime accepted, in ticks.
    pub max_ttl_ticks: u32,
}

/// NPC sensing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerceptionConfig {
    /// Maximum sensing distance.
    pub sense_range: f32,
    /// Full field-of-view angle in degrees.
    pub fov_degrees: f32,
    /// Seconds of continuous sight to go from 0 to 1 suspicion.
    pub ramp_time_secs: f32,
    /// Seconds without sight to decay from 1 to 0 suspicion.
    pub decay_time_secs: f32,
    /// Suspicion level of the `Suspicious` state.
    pub suspicious_threshold: f32,
    /// Suspicion level of the `Spotted` state.
    pub spotted_threshold: f32,
    /// Height of NPC and player eyes above their positions.
    pub eye_height: f32,
}

/// How handshakes are validated.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthMode {
    /// Accept any non-empty token and client id (development).
    #[default]
    Open,
    /// Accept only entries listed in `tokens`.
    Tokens,
}

/// One issued session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenEntry {
    pub token: String,
    pub client_id: String,
    /// Unix timestamp after which the token is rejected.
    #[serde(default)]
    pub expires_at_unix: Option<u64>,
}

/// Handshake validation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub tokens: Vec<TokenEntry>,
}

/// Effect of a spell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SpellDef {
    /// Fire a projectile from the caster's eye along the aim direction.
    Projectile { speed: f32, ttl_ticks: u32, damage: f32 },
    /// Apply a terraform at `range` units along the aim direction.
    Terraform {
        op: TerraformKind,
        radius: f32,
        material: u16,
        range: f32,
    },
}

/// Spell book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpellsConfig {
    /// Spells by id.
    pub book: BTreeMap<String, SpellDef>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for the JSON log file. No file logging when unset.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7777,
            max_connections: 64,
            max_protocol_errors: 5,
            max_frame_bytes: 1_048_576,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            snapshot_rate: 20,
            perception_interval_ticks: 6,
            max_steps_per_frame: 10,
            max_accumulated_secs: 0.25,
            input_queue_capacity: 64,
            spawn_point: [0.0, 0.0, 0.0],
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: 5.0,
            gravity: 20.0,
            jump_speed: 7.0,
            eye_height: 1.6,
            player_health: 100.0,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            max_radius: 16.0,
            max_material: u8::MAX,
        }
    }
}

impl Default for ProjectileConfig {
    fn default() -> Self {
        Self {
            target_radius: 0.5,
            max_speed: 200.0,
            max_ttl_ticks: 600,
        }
    }
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            sense_range: 30.0,
            fov_degrees: 90.0,
            ramp_time_secs: 2.0,
            decay_time_secs: 4.0,
            suspicious_threshold: 0.3,
            spotted_threshold: 0.8,
            eye_height: 1.6,
        }
    }
}

impl Default for SpellsConfig {
    fn default() -> Self {
        let mut book = BTreeMap::new();
        book.insert(
            "fireball".to_string(),
            SpellDef::Projectile {
                speed: 30.0,
                ttl_ticks: 180,
                damage: 25.0,
            },
        );
        book.insert(
            "raise_earth".to_string(),
            SpellDef::Terraform {
                op: TerraformKind::SphereAdd,
                radius: 2.0,
                material: 2,
                range: 6.0,
            },
        );
        book.insert(
            "dig".to_string(),
            SpellDef::Terraform {
                op: TerraformKind::SphereSub,
                radius: 2.0,
                material: 0,
                range: 4.0,
            },
        );
        Self { book }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for the server, or the working directory
    /// when the platform has none.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("strata-server"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject settings the tick loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be positive".into()));
        }
        if sim.snapshot_rate == 0 || sim.snapshot_rate > sim.tick_rate {
            return Err(ConfigError::Invalid(format!(
                "snapshot_rate {} must be in 1..={}",
                sim.snapshot_rate, sim.tick_rate
            )));
        }
        if sim.tick_rate % sim.snapshot_rate != 0 {
            return Err(ConfigError::Invalid(format!(
                "tick_rate {} is not a multiple of snapshot_rate {}",
                sim.tick_rate, sim.snapshot_rate
            )));
        }
        if sim.perception_interval_ticks == 0 {
            return Err(ConfigError::Invalid(
                "perception_interval_ticks must be positive".into(),
            ));
        }
        let p = &self.perception;
        if !(0.0 < p.suspicious_threshold && p.suspicious_threshold < p.spotted_threshold)
            || p.spotted_threshold > 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "perception thresholds must satisfy 0 < {} < {} <= 1",
                p.suspicious_threshold, p.spotted_threshold
            )));
        }
        if p.ramp_time_secs <= 0.0 || p.decay_time_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "perception ramp and decay times must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Snapshot broadcast interval in ticks (`tick_rate / snapshot_rate`).
    pub fn snapshot_interval_ticks(&self) -> u32 {
        (self.simulation.tick_rate / self.simulation.snapshot_rate.max(1)).max(1)
    }
}
