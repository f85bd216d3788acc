use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::registry::RegistryConfig;
use crate::storage::DEFAULT_MAX_PACKAGE_SIZE;

pub const CONFIGURATION_FILE_ENV: &str = "APP_CONFIGURATION_FILE";
const DEFAULT_CONFIGURATION_FILE: &str = "configuration";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub adapters: Vec<AdapterSettings>,
    #[serde(default)]
    pub content_store: ContentStoreSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "RegistrySettings::default_interval")]
    pub health_check_interval_secs: u64,
    #[serde(default = "RegistrySettings::default_timeout")]
    pub health_check_timeout_secs: u64,
    /// Run the periodic health loop after startup.
    #[serde(default = "default_true")]
    pub health_checks_enabled: bool,
}

impl RegistrySettings {
    fn default_interval() -> u64 {
        30
    }

    fn default_timeout() -> u64 {
        5
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            health_check_timeout: Duration::from_secs(self.health_check_timeout_secs),
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: Self::default_interval(),
            health_check_timeout_secs: Self::default_timeout(),
            health_checks_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Memory,
    Overlay,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Overlay => "overlay",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterSettings {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AdapterKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub default: bool,
    /// Adapter-specific settings; stored verbatim in the plugin metadata.
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentStoreSettings {
    #[serde(default = "ContentStoreSettings::default_max_size")]
    pub max_package_size: usize,
}

impl ContentStoreSettings {
    fn default_max_size() -> usize {
        DEFAULT_MAX_PACKAGE_SIZE
    }
}

impl Default for ContentStoreSettings {
    fn default() -> Self {
        Self {
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
        }
    }
}

fn default_true() -> bool {
    true
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let file = std::env::var(CONFIGURATION_FILE_ENV)
        .unwrap_or_else(|_| DEFAULT_CONFIGURATION_FILE.to_string());
    load_configuration(&file)
}

/// Reads `file` (any extension the `config` crate knows, optional) and overlays
/// `APP_`-prefixed environment variables, e.g. `APP_REGISTRY__HEALTH_CHECK_INTERVAL_SECS`.
pub fn load_configuration(file: &str) -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(file).required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}
