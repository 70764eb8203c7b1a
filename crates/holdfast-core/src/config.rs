//! Configuration loading and typed config structures for the Holdfast
//! simulation.
//!
//! Configuration is a YAML document with one section per concern. Every
//! field has a default, so an empty document is a valid configuration.
//! Selected fields can be overridden from `HOLDFAST_*` environment
//! variables after parsing.
//!
//! The live configuration sits behind a [`ConfigHandle`]. Reloading swaps
//! every section except the grid dimensions, which are fixed for the life
//! of a world.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use holdfast_agents::NeedsConfig;
use holdfast_runner::SurvivalThresholds;
use holdfast_types::GridSize;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Smallest accepted tick interval.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;

/// Errors that can occur when loading or reloading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// A value is outside its accepted range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A reload tried to change a field that is fixed at startup.
    #[error("{field} cannot change while the simulation is running")]
    ImmutableField {
        /// Dotted field path.
        field: &'static str,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// World generation.
    #[serde(default)]
    pub world: WorldConfig,

    /// Tick timing and bounds.
    #[serde(default)]
    pub tick: TickConfig,

    /// Observation radius and list caps.
    #[serde(default)]
    pub observation: ObservationConfig,

    /// Provider dispatch, retry, and caching.
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Needs decay rates and thresholds.
    #[serde(default)]
    pub needs: NeedsConfig,

    /// Prices and wages used by world generation.
    #[serde(default)]
    pub economy: EconomyConfig,

    /// Where events and snapshots are written.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or a validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Self::parse_with(yaml, |key| std::env::var(key).ok())
    }

    /// Parse configuration, reading overrides through `lookup`.
    pub fn parse_with(
        yaml: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HOLDFAST_*` overrides read through `lookup`.
    ///
    /// - `HOLDFAST_SEED` overrides `world.seed`
    /// - `HOLDFAST_TICK_INTERVAL_MS` overrides `tick.interval_ms`
    /// - `HOLDFAST_MAX_TICKS` overrides `tick.max_ticks`
    /// - `HOLDFAST_VISIBILITY_RADIUS` overrides `observation.visibility_radius`
    /// - `HOLDFAST_PROVIDER_TIMEOUT_MS` overrides `decision.provider_timeout_ms`
    /// - `HOLDFAST_RETRY_COUNT` overrides `decision.retry_count`
    /// - `HOLDFAST_CACHE_TTL_SECS` overrides `decision.cache_ttl_secs`
    /// - `HOLDFAST_CONCURRENCY_LIMIT` overrides `decision.concurrency_limit`
    /// - `HOLDFAST_FOOD_NUTRITION` overrides `needs.food_nutrition`
    /// - `HOLDFAST_SLEEP_RECOVERY` overrides `needs.sleep_recovery`
    /// - `HOLDFAST_EVENT_LOG` overrides `storage.event_log`
    /// - `HOLDFAST_SNAPSHOT_DIR` overrides `storage.snapshot_dir`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        override_number(&lookup, "HOLDFAST_SEED", &mut self.world.seed)?;
        override_number(&lookup, "HOLDFAST_TICK_INTERVAL_MS", &mut self.tick.interval_ms)?;
        override_number(&lookup, "HOLDFAST_MAX_TICKS", &mut self.tick.max_ticks)?;
        override_number(
            &lookup,
            "HOLDFAST_VISIBILITY_RADIUS",
            &mut self.observation.visibility_radius,
        )?;
        override_number(
            &lookup,
            "HOLDFAST_PROVIDER_TIMEOUT_MS",
            &mut self.decision.provider_timeout_ms,
        )?;
        override_number(&lookup, "HOLDFAST_RETRY_COUNT", &mut self.decision.retry_count)?;
        override_number(&lookup, "HOLDFAST_CACHE_TTL_SECS", &mut self.decision.cache_ttl_secs)?;
        override_number(
            &lookup,
            "HOLDFAST_CONCURRENCY_LIMIT",
            &mut self.decision.concurrency_limit,
        )?;
        override_number(&lookup, "HOLDFAST_FOOD_NUTRITION", &mut self.needs.food_nutrition)?;
        override_number(&lookup, "HOLDFAST_SLEEP_RECOVERY", &mut self.needs.sleep_recovery)?;
        if let Some(path) = lookup("HOLDFAST_EVENT_LOG") {
            self.storage.event_log = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("HOLDFAST_SNAPSHOT_DIR") {
            self.storage.snapshot_dir = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.width == 0 || self.world.height == 0 {
            return Err(ConfigError::Invalid {
                field: "world.width/height",
                reason: "grid must have at least one cell".to_owned(),
            });
        }
        if self.tick.interval_ms < MIN_TICK_INTERVAL_MS {
            return Err(ConfigError::Invalid {
                field: "tick.interval_ms",
                reason: format!("must be at least {MIN_TICK_INTERVAL_MS}"),
            });
        }
        if self.decision.concurrency_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "decision.concurrency_limit",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.decision.provider_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "decision.provider_timeout_ms",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.needs.gather_yield == 0 {
            return Err(ConfigError::Invalid {
                field: "needs.gather_yield",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.economy.food_price <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                field: "economy.food_price",
                reason: "must be positive".to_owned(),
            });
        }
        Ok(())
    }

    /// Grid dimensions described by the `world` section.
    pub const fn grid(&self) -> GridSize {
        GridSize {
            width: self.world.width,
            height: self.world.height,
        }
    }

    /// Hunger and energy thresholds for the fallback heuristic.
    pub const fn survival_thresholds(&self) -> SurvivalThresholds {
        SurvivalThresholds {
            hungry_below: self.needs.hungry_threshold,
            exhausted_below: self.needs.exhausted_threshold,
        }
    }
}

fn override_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(var) {
        *target = value
            .trim()
            .parse()
            .map_err(|_parse| ConfigError::InvalidEnv { var, value })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// World generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Grid columns. Fixed for the life of a world.
    #[serde(default = "default_grid_side")]
    pub width: u32,

    /// Grid rows. Fixed for the life of a world.
    #[serde(default = "default_grid_side")]
    pub height: u32,

    /// Seed for world generation.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Agents created at genesis.
    #[serde(default = "default_agents")]
    pub agents: u32,

    /// Resource spawns created at genesis.
    #[serde(default = "default_spawns")]
    pub spawns: u32,

    /// Vendors created at genesis.
    #[serde(default = "default_vendors")]
    pub vendors: u32,

    /// Shelters created at genesis.
    #[serde(default = "default_shelters")]
    pub shelters: u32,

    /// Contracts created at genesis between distinct agents.
    #[serde(default = "default_contracts")]
    pub contracts: u32,

    /// Currency each agent starts with.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_grid_side(),
            height: default_grid_side(),
            seed: default_seed(),
            agents: default_agents(),
            spawns: default_spawns(),
            vendors: default_vendors(),
            shelters: default_shelters(),
            contracts: default_contracts(),
            starting_balance: default_starting_balance(),
        }
    }
}

/// Tick timing and run bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickConfig {
    /// Milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub interval_ms: u64,

    /// Stop after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Take a snapshot every N ticks (0 = never).
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,
}

impl TickConfig {
    /// The tick interval as a [`Duration`].
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_tick_interval_ms(),
            max_ticks: 0,
            snapshot_interval_ticks: default_snapshot_interval_ticks(),
        }
    }
}

/// What an agent can perceive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// Manhattan radius of the visible area.
    #[serde(default = "default_visibility_radius")]
    pub visibility_radius: u32,

    /// Cap on other agents listed.
    #[serde(default = "default_max_nearby")]
    pub max_nearby_agents: usize,

    /// Cap on each of spawns, vendors, and shelters listed.
    #[serde(default = "default_max_nearby")]
    pub max_nearby_entities: usize,

    /// Cap on recent-activity summaries.
    #[serde(default = "default_max_recent_events")]
    pub max_recent_events: usize,

    /// Cap on the observer's own memories.
    #[serde(default = "default_max_memories")]
    pub max_memories: usize,

    /// How many ticks back recent activity reaches.
    #[serde(default = "default_recent_event_window")]
    pub recent_event_window: u64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            visibility_radius: default_visibility_radius(),
            max_nearby_agents: default_max_nearby(),
            max_nearby_entities: default_max_nearby(),
            max_recent_events: default_max_recent_events(),
            max_memories: default_max_memories(),
            recent_event_window: default_recent_event_window(),
        }
    }
}

/// Provider dispatch policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Deadline for one provider call.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// Extra attempts after a transient provider failure.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Pause before each retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Seconds a cached decision stays valid.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum cached decisions.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Maximum concurrent provider calls in one tick.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

impl DecisionConfig {
    /// Per-call provider deadline.
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Delay before a retry.
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Cache entry lifetime.
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

/// Prices and wages used when generating a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Vendor price of one food.
    #[serde(default = "default_food_price")]
    pub food_price: Decimal,

    /// Vendor price of one wood.
    #[serde(default = "default_wood_price")]
    pub wood_price: Decimal,

    /// Vendor price of one stone.
    #[serde(default = "default_stone_price")]
    pub stone_price: Decimal,

    /// Units of each item a vendor starts with.
    #[serde(default = "default_vendor_stock")]
    pub vendor_stock: u32,

    /// Wage paid per contract shift.
    #[serde(default = "default_wage")]
    pub wage: Decimal,

    /// Shifts per generated contract.
    #[serde(default = "default_contract_shifts")]
    pub contract_shifts: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            food_price: default_food_price(),
            wood_price: default_wood_price(),
            stone_price: default_stone_price(),
            vendor_stock: default_vendor_stock(),
            wage: default_wage(),
            contract_shifts: default_contract_shifts(),
        }
    }
}

/// Event and snapshot locations. Unset paths keep data in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON-lines event log.
    #[serde(default)]
    pub event_log: Option<PathBuf>,

    /// Snapshot directory.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Live handle
// ---------------------------------------------------------------------------

/// Shared, hot-reloadable configuration.
///
/// Readers take a cheap [`Arc`] of the current value. The tick pipeline
/// reads it once at the start of each tick, so a reload applies from the
/// next tick on.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<SimulationConfig>>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The configuration in force.
    pub fn current(&self) -> Arc<SimulationConfig> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the configuration.
    ///
    /// Grid dimensions cannot change; everything else takes effect on the
    /// next tick.
    pub fn reload(&self, next: SimulationConfig) -> Result<(), ConfigError> {
        next.validate()?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if next.world.width != guard.world.width {
            return Err(ConfigError::ImmutableField {
                field: "world.width",
            });
        }
        if next.world.height != guard.world.height {
            return Err(ConfigError::ImmutableField {
                field: "world.height",
            });
        }
        *guard = Arc::new(next);
        tracing::info!("configuration reloaded");
        Ok(())
    }

    /// Replace the configuration without the grid check. Used by reset,
    /// which starts a new world.
    pub(crate) fn replace(&self, next: SimulationConfig) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(next);
    }

    /// Update the tick interval in place.
    pub(crate) fn set_tick_interval_ms(&self, interval_ms: u64) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = SimulationConfig::clone(&guard);
        next.tick.interval_ms = interval_ms;
        *guard = Arc::new(next);
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_grid_side() -> u32 {
    32
}

const fn default_seed() -> u64 {
    42
}

const fn default_agents() -> u32 {
    10
}

const fn default_spawns() -> u32 {
    12
}

const fn default_vendors() -> u32 {
    3
}

const fn default_shelters() -> u32 {
    2
}

const fn default_contracts() -> u32 {
    2
}

const fn default_starting_balance() -> Decimal {
    Decimal::from_parts(100, 0, 0, false, 0)
}

const fn default_tick_interval_ms() -> u64 {
    60_000
}

const fn default_snapshot_interval_ticks() -> u64 {
    100
}

const fn default_visibility_radius() -> u32 {
    5
}

const fn default_max_nearby() -> usize {
    8
}

const fn default_max_recent_events() -> usize {
    10
}

const fn default_max_memories() -> usize {
    5
}

const fn default_recent_event_window() -> u64 {
    3
}

const fn default_provider_timeout_ms() -> u64 {
    30_000
}

const fn default_retry_count() -> u32 {
    1
}

const fn default_retry_backoff_ms() -> u64 {
    250
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_cache_capacity() -> usize {
    4096
}

const fn default_concurrency_limit() -> usize {
    8
}

const fn default_food_price() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 0)
}

const fn default_wood_price() -> Decimal {
    Decimal::from_parts(3, 0, 0, false, 0)
}

const fn default_stone_price() -> Decimal {
    Decimal::from_parts(4, 0, 0, false, 0)
}

const fn default_vendor_stock() -> u32 {
    20
}

const fn default_wage() -> Decimal {
    Decimal::from_parts(10, 0, 0, false, 0)
}

const fn default_contract_shifts() -> u32 {
    5
}
