//! Configuration for philair hosts.
//!
//! TOML device profiles and model overrides, loaded with figment from the
//! platform config dir plus `PHILAIR_` environment variables, and translated
//! into `philair_core::CoordinatorConfig` and `philair_core::ModelCatalog`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use philair_api::{DEFAULT_PORT, DeviceTarget};
use philair_core::{
    CoordinatorConfig, CoreError, DescriptorOverrides, ModelCatalog, ModelDescriptor,
    ReconnectConfig,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown model '{model}' referenced by {referrer}")]
    UnknownModel { model: String, referrer: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Settings applied to every device unless the profile overrides them.
    #[serde(default)]
    pub defaults: Defaults,

    /// Devices by name.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceProfile>,

    /// Extra or adjusted model descriptors by model id.
    #[serde(default)]
    pub models: BTreeMap<String, ModelProfile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    /// Seconds allowed for opening a session.
    pub setup_timeout: u64,

    /// Seconds between expected status pushes.
    pub base_interval: u64,

    pub missed_packet_threshold: u32,

    /// Reset the watchdog on every received status.
    pub watchdog: bool,

    pub reconnect: ReconnectDefaults,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            setup_timeout: 25,
            base_interval: 60,
            missed_packet_threshold: 3,
            watchdog: true,
            reconnect: ReconnectDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectDefaults {
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub max_retries: u32,
    /// Ignore `max_retries` and keep trying until the session is replaced
    /// or shut down.
    pub retry_forever: bool,
}

impl Default for ReconnectDefaults {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_secs: 30,
            max_retries: 3,
            retry_forever: false,
        }
    }
}

/// One configured device.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// Hostname or IP address.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Model id from the catalog, e.g. "AC2889".
    pub model: String,

    /// Display name; the device-reported name is used when unset.
    pub name: Option<String>,

    /// Override `defaults.setup_timeout`.
    pub setup_timeout: Option<u64>,

    /// Override `defaults.watchdog`.
    pub watchdog: Option<bool>,

    /// Descriptor adjustments for this device only.
    #[serde(default)]
    pub overrides: DescriptorOverrides,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// A model descriptor declared in configuration.
///
/// With `base` set the model is derived from that descriptor; without it,
/// the overrides adjust the existing model of the same id.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ModelProfile {
    pub base: Option<String>,

    #[serde(flatten)]
    pub overrides: DescriptorOverrides,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "philair", "philair").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("philair");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys use `__` between levels:
/// `PHILAIR_DEFAULTS__BASE_INTERVAL=30`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PHILAIR_").split("__"));

    let config: Config = figment.extract()?;
    debug!(
        devices = config.devices.len(),
        models = config.models.len(),
        "configuration loaded"
    );
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "configuration saved");
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    pub fn device(&self, name: &str) -> Result<&DeviceProfile, ConfigError> {
        self.devices.get(name).ok_or_else(|| ConfigError::Validation {
            field: "devices".into(),
            reason: format!("no device named '{name}'"),
        })
    }
}

/// Build a `CoordinatorConfig` for one device profile.
pub fn device_to_coordinator_config(
    name: &str,
    profile: &DeviceProfile,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    let field = |f: &str| format!("devices.{name}.{f}");

    let host = profile.host.trim();
    if host.is_empty() {
        return Err(ConfigError::Validation {
            field: field("host"),
            reason: "must not be empty".into(),
        });
    }
    if profile.port == 0 {
        return Err(ConfigError::Validation {
            field: field("port"),
            reason: "must be between 1 and 65535".into(),
        });
    }

    let setup_timeout = profile.setup_timeout.unwrap_or(defaults.setup_timeout);
    if setup_timeout == 0 {
        return Err(ConfigError::Validation {
            field: field("setup_timeout"),
            reason: "must be at least one second".into(),
        });
    }
    if defaults.base_interval == 0 {
        return Err(ConfigError::Validation {
            field: "defaults.base_interval".into(),
            reason: "must be at least one second".into(),
        });
    }

    let mut config = CoordinatorConfig::new(DeviceTarget::new(host).with_port(profile.port));
    config.setup_timeout = Duration::from_secs(setup_timeout);
    config.base_interval = Duration::from_secs(defaults.base_interval);
    config.missed_packet_threshold = defaults.missed_packet_threshold;
    config.watchdog_enabled = profile.watchdog.unwrap_or(defaults.watchdog);
    config.reconnect = reconnect_config(&defaults.reconnect)?;
    Ok(config)
}

fn reconnect_config(defaults: &ReconnectDefaults) -> Result<ReconnectConfig, ConfigError> {
    let initial_delay = Duration::from_millis(defaults.initial_delay_ms);
    let max_delay = Duration::from_secs(defaults.max_delay_secs);
    if max_delay < initial_delay {
        return Err(ConfigError::Validation {
            field: "defaults.reconnect.max_delay_secs".into(),
            reason: "must not be shorter than initial_delay_ms".into(),
        });
    }

    Ok(ReconnectConfig {
        initial_delay,
        max_delay,
        max_retries: (!defaults.retry_forever).then_some(defaults.max_retries),
    })
}

/// Built-in catalog plus every `[models.*]` entry.
///
/// Entries may derive from one another in any order; a base that never
/// becomes available is reported as [`ConfigError::UnknownModel`].
pub fn build_catalog(config: &Config) -> Result<ModelCatalog, ConfigError> {
    let mut catalog = ModelCatalog::builtin();
    let mut pending: Vec<(&String, &ModelProfile)> = config.models.iter().collect();

    while !pending.is_empty() {
        let before = pending.len();
        let mut blocked = Vec::new();

        for (model, profile) in pending {
            let start = profile.base.as_deref().unwrap_or(model);
            if !catalog.contains(start) {
                blocked.push((model, profile));
                continue;
            }
            catalog
                .apply_overrides(model, &profile.overrides, profile.base.as_deref())
                .map_err(|e| model_error(e, &format!("models.{model}")))?;
            debug!(model = %model, base = start, "registered configured model");
        }

        if blocked.len() == before {
            let (model, profile) = blocked[0];
            return Err(ConfigError::UnknownModel {
                model: profile.base.clone().unwrap_or_else(|| model.clone()),
                referrer: format!("models.{model}"),
            });
        }
        pending = blocked;
    }

    Ok(catalog)
}

/// The descriptor one device runs with: its catalog model plus its own
/// overrides.
pub fn device_descriptor(
    catalog: &ModelCatalog,
    name: &str,
    profile: &DeviceProfile,
) -> Result<ModelDescriptor, ConfigError> {
    let base = catalog
        .get(&profile.model)
        .map_err(|e| model_error(e, &format!("devices.{name}")))?;
    Ok(base.overlay(base.model.clone(), &profile.overrides))
}

fn model_error(err: CoreError, referrer: &str) -> ConfigError {
    match err {
        CoreError::UnknownModel { model } => ConfigError::UnknownModel {
            model,
            referrer: referrer.to_owned(),
        },
        other => ConfigError::Validation {
            field: referrer.to_owned(),
            reason: other.to_string(),
        },
    }
}
