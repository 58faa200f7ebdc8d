//! # tagalloc Configuration
//!
//! Sizing policy and failure behaviour for the allocation tracker.
//!
//! The defaults are plain constants so a firmware build can use them without
//! touching the loader at all. Hosted tools can layer a YAML file and
//! `TAGALLOC_*` environment variables on top.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
pub mod validation;

pub use error::ConfigError;

/// Smallest number of slots the table may ever hold.
pub const DEFAULT_MIN_TABLE_SIZE: usize = 32;
/// Number of slots allocated when the tracker is constructed.
pub const DEFAULT_INITIAL_TABLE_SIZE: usize = 64;
/// Slots added each time the table runs out of room.
pub const DEFAULT_GROW_STEP: usize = 32;
/// Free slots required before the table gives some back. Must exceed
/// [`DEFAULT_GROW_STEP`].
pub const DEFAULT_SHRINK_STEP: usize = 64;
/// How long a table operation waits for the lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5;

/// Default location of the optional configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/tagalloc.yaml";

/// What the tracker does once it hits a fault it cannot recover from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the fault and abort the process.
    #[default]
    Abort,
    /// Log the fault and panic, letting the caller unwind.
    Panic,
}

/// Tracker sizing and locking parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Floor for the table size (entries).
    #[serde(default = "default_min_table_size")]
    #[validate(range(min = 1, max = 1_048_576))]
    pub min_table_size: usize,

    /// Table size at construction (entries).
    #[serde(default = "default_initial_table_size")]
    #[validate(range(min = 1, max = 1_048_576))]
    pub initial_table_size: usize,

    /// Entries added when the table is full.
    #[serde(default = "default_grow_step")]
    #[validate(range(min = 1, max = 65_536))]
    pub grow_step: usize,

    /// Free entries needed before the table shrinks, and the amount removed.
    #[serde(default = "default_shrink_step")]
    #[validate(range(min = 2, max = 65_536))]
    pub shrink_step: usize,

    /// Bounded wait for the table lock, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    #[validate(range(min = 1, max = 60_000))]
    pub lock_timeout_ms: u64,

    /// Behaviour on fatal faults.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_min_table_size() -> usize {
    DEFAULT_MIN_TABLE_SIZE
}

fn default_initial_table_size() -> usize {
    DEFAULT_INITIAL_TABLE_SIZE
}

fn default_grow_step() -> usize {
    DEFAULT_GROW_STEP
}

fn default_shrink_step() -> usize {
    DEFAULT_SHRINK_STEP
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_table_size: default_min_table_size(),
            initial_table_size: default_initial_table_size(),
            grow_step: default_grow_step(),
            shrink_step: default_shrink_step(),
            lock_timeout_ms: default_lock_timeout_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Lock wait bound as a [`Duration`].
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Same config with a different failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Run field validation and the cross-field checks.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        validation::check_initial_size(self)?;
        validation::check_hysteresis(self)?;
        Ok(())
    }

    /// Load configuration from the default file and environment.
    ///
    /// Hierarchy:
    /// 1. Compiled-in defaults
    /// 2. `config/tagalloc.yaml`, if present
    /// 3. `TAGALLOC_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(TrackerConfig::default()));

        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
        }

        Self::finish(figment)
    }

    /// Load configuration from a specific file, still honouring the
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(TrackerConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("TAGALLOC_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.check()?;
                Ok(config)
            })
    }
}
