use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Spacing between freshly allocated column positions.
pub const DEFAULT_POSITION_STRIDE: i64 = 1000;
/// A midpoint insert needs neighbours at least this far apart.
pub const DEFAULT_MIN_POSITION_GAP: i64 = 2;
/// Longest plausible gap between two polls of a connected client.
pub const DEFAULT_RETENTION_SECS: u64 = 300;
pub const DEFAULT_BUS_CAPACITY: usize = 10_000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// Minimum number of past substitutions before a teacher is suggested.
/// At 1 every prior occurrence counts.
pub const MIN_SUBSTITUTIONS_THRESHOLD: u32 = 1;
pub const MAX_RECOMMENDED_CANDIDATES: usize = 3;

/// Top-level config (schoolday.toml + SCHOOLDAY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchooldayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub positions: PositionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token for `POST /sync/push` and the operator routes.
    /// `None` leaves those routes open (local development only).
    #[serde(default)]
    pub push_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            push_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Column position spacing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionConfig {
    #[serde(default = "default_stride")]
    pub stride: i64,
    /// Neighbour gap below which a midpoint insert triggers compaction.
    #[serde(default = "default_min_gap")]
    pub min_gap: i64,
}

impl PositionConfig {
    /// A compacted day must leave room for a midpoint between neighbours,
    /// so the stride has to reach the minimum gap (and never less than 2).
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.min_gap < 1 {
            return Err(crate::error::SchooldayError::Config(format!(
                "positions.min_gap must be positive, got {}",
                self.min_gap
            )));
        }
        if self.stride < self.min_gap.max(2) {
            return Err(crate::error::SchooldayError::Config(format!(
                "positions.stride ({}) must be at least positions.min_gap ({}) and 2",
                self.stride, self.min_gap
            )));
        }
        Ok(())
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            stride: DEFAULT_POSITION_STRIDE,
            min_gap: DEFAULT_MIN_POSITION_GAP,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Advertised to clients; the server never holds a poll open.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            capacity: DEFAULT_BUS_CAPACITY,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

/// Nightly archival trigger. Times are UTC; the run archives yesterday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "bool_true")]
    pub nightly_enabled: bool,
    #[serde(default = "default_nightly_hour")]
    pub nightly_hour: u8,
    #[serde(default)]
    pub nightly_minute: u8,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            nightly_enabled: true,
            nightly_hour: default_nightly_hour(),
            nightly_minute: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_min_substitutions")]
    pub min_substitutions: u32,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            min_substitutions: MIN_SUBSTITUTIONS_THRESHOLD,
            max_candidates: MAX_RECOMMENDED_CANDIDATES,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_stride() -> i64 {
    DEFAULT_POSITION_STRIDE
}
fn default_min_gap() -> i64 {
    DEFAULT_MIN_POSITION_GAP
}
fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}
fn default_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_nightly_hour() -> u8 {
    2
}
fn default_min_substitutions() -> u32 {
    MIN_SUBSTITUTIONS_THRESHOLD
}
fn default_max_candidates() -> usize {
    MAX_RECOMMENDED_CANDIDATES
}
fn default_cache_ttl_secs() -> i64 {
    300
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.schoolday/schoolday.db", home)
}

impl SchooldayConfig {
    /// Load config from a TOML file with SCHOOLDAY_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `SCHOOLDAY_GATEWAY__PUSH_TOKEN` or `SCHOOLDAY_SYNC__RETENTION_SECS`,
    /// because several keys contain single underscores themselves.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let cfg: Self = Self::figment(&path)
            .merge(Env::prefixed("SCHOOLDAY_").split("__"))
            .extract()
            .map_err(|e| crate::error::SchooldayError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults, without env overrides.
    pub fn from_toml_str(toml: &str) -> crate::error::Result<Self> {
        let cfg: Self = Figment::from(Serialized::defaults(SchooldayConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| crate::error::SchooldayError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would break the engine at runtime.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.positions.validate()
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(SchooldayConfig::default())).merge(Toml::file(path))
    }
}

fn default_config_path() -> String {
    if let Ok(path) = std::env::var("SCHOOLDAY_CONFIG") {
        return path;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.schoolday/schoolday.toml", home)
}
