use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{
    Adapter, Capability, FileRecordClient, MemoryAdapter, MemoryRecordClient, OverlayAdapter,
    OverlayConfig, RecordClient,
};
use crate::configuration::{AdapterKind, AdapterSettings, Settings};
use crate::registry::{Registry, RegistryError};
use crate::storage::{
    MemoryPackageContentStore, MemorySubscriptionStore, PackageContentStore, SubscriptionStore,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration for adapter {name}: {source}")]
    AdapterConfig {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("default adapter {0} is disabled")]
    DisabledDefault(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Configuration(#[from] config::ConfigError),
}

/// Memory adapter options.
#[derive(Debug, Default, Deserialize)]
struct MemoryAdapterOptions {
    #[serde(default)]
    capabilities: Option<Vec<Capability>>,
}

/// Overlay adapter options. Records go to `record_root` when set, otherwise they
/// are kept in process.
#[derive(Debug, Deserialize)]
struct OverlayAdapterOptions {
    #[serde(flatten)]
    overlay: OverlayConfig,
    #[serde(default)]
    record_root: Option<String>,
}

fn options<T>(entry: &AdapterSettings) -> Result<T, StartupError>
where
    T: for<'de> Deserialize<'de>,
{
    let map = entry
        .config
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<serde_json::Map<String, Value>>();
    serde_json::from_value(Value::Object(map)).map_err(|source| StartupError::AdapterConfig {
        name: entry.name.clone(),
        source,
    })
}

pub fn build_adapter(entry: &AdapterSettings) -> Result<Arc<dyn Adapter>, StartupError> {
    let adapter: Arc<dyn Adapter> = match entry.kind {
        AdapterKind::Memory => {
            let options: MemoryAdapterOptions = options(entry)?;
            match options.capabilities {
                Some(capabilities) => {
                    Arc::new(MemoryAdapter::with_capabilities(&entry.name, capabilities))
                }
                None => Arc::new(MemoryAdapter::new(&entry.name)),
            }
        }
        AdapterKind::Overlay => {
            let options: OverlayAdapterOptions = options(entry)?;
            let client: Arc<dyn RecordClient> = match &options.record_root {
                Some(root) => Arc::new(FileRecordClient::new(root)),
                None => Arc::new(MemoryRecordClient::new()),
            };
            Arc::new(OverlayAdapter::new(&entry.name, options.overlay, client))
        }
    };
    Ok(adapter)
}

/// Registers every configured adapter. Disabled entries are registered and then
/// disabled so they stay visible in the metadata listing.
#[tracing::instrument(name = "Build registry", skip(settings))]
pub async fn build_registry(settings: &Settings) -> Result<Registry, StartupError> {
    if let Some(entry) = settings.adapters.iter().find(|a| a.default && !a.enabled) {
        return Err(StartupError::DisabledDefault(entry.name.clone()));
    }

    let registry = Registry::new(settings.registry.registry_config());
    for entry in &settings.adapters {
        let adapter = match build_adapter(entry) {
            Ok(adapter) => adapter,
            Err(err) => {
                let _ = registry.close().await;
                return Err(err);
            }
        };
        if let Err(err) = registry
            .register(
                &entry.name,
                entry.kind.as_str(),
                adapter.clone(),
                entry.config.clone(),
                entry.default,
            )
            .await
        {
            let _ = adapter.close().await;
            let _ = registry.close().await;
            return Err(err.into());
        }
        if !entry.enabled {
            registry.disable(&entry.name).await?;
        }
    }

    tracing::info!(
        adapters = settings.adapters.len(),
        default = registry.get_default_name().await.as_deref().unwrap_or("none"),
        "Registry ready"
    );
    Ok(registry)
}

/// The wired gateway core: registry plus the stores next to it.
pub struct Application {
    pub settings: Settings,
    pub registry: Arc<Registry>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub package_content: Arc<dyn PackageContentStore>,
}

impl Application {
    pub async fn build(settings: Settings) -> Result<Self, StartupError> {
        let registry = Arc::new(build_registry(&settings).await?);
        let package_content = Arc::new(MemoryPackageContentStore::new(
            settings.content_store.max_package_size,
        ));
        Ok(Self {
            settings,
            registry,
            subscriptions: Arc::new(MemorySubscriptionStore::new()),
            package_content,
        })
    }

    pub async fn start(&self) {
        if self.settings.registry.health_checks_enabled {
            self.registry.start_health_checks().await;
        }
    }

    /// Stops the health loop and closes every adapter and store. Returns the
    /// registry's close error, if any, after the stores are closed as well.
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        let closed = self.registry.close().await;
        if let Err(err) = self.subscriptions.close().await {
            tracing::error!("Failed to close subscription store: {}", err);
        }
        closed
    }

    pub fn adapter_config(&self, name: &str) -> Option<&HashMap<String, Value>> {
        self.settings
            .adapters
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{ContentStoreSettings, RegistrySettings};

    fn entry(name: &str, kind: AdapterKind) -> AdapterSettings {
        AdapterSettings {
            name: name.to_string(),
            kind,
            enabled: true,
            default: false,
            config: HashMap::new(),
        }
    }

    fn settings(adapters: Vec<AdapterSettings>) -> Settings {
        Settings {
            registry: RegistrySettings::default(),
            adapters,
            content_store: ContentStoreSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_build_registry_from_settings() {
        let mut local = entry("local", AdapterKind::Memory);
        local.default = true;
        let mut overlay = entry("kustomize", AdapterKind::Overlay);
        overlay.enabled = false;
        overlay
            .config
            .insert("tracking_namespace".to_string(), Value::from("dms-tracking"));

        let registry = build_registry(&settings(vec![local, overlay])).await.unwrap();

        assert_eq!(registry.get_default_name().await.as_deref(), Some("local"));
        let metadata = registry.get_metadata("kustomize").await.unwrap();
        assert_eq!(metadata.adapter_type, "overlay");
        assert!(!metadata.enabled);
        assert_eq!(
            metadata.config.get("tracking_namespace"),
            Some(&Value::from("dms-tracking"))
        );
        assert_eq!(registry.find_by_type("overlay").await.len(), 0);
        assert_eq!(registry.list().await.len(), 2);
        registry.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_capabilities_from_config() {
        let mut local = entry("gitops", AdapterKind::Memory);
        local
            .config
            .insert("capabilities".to_string(), serde_json::json!(["gitops", "health-checks"]));
        let adapter = build_adapter(&local).unwrap();
        assert!(adapter.supports_gitops());
        assert!(!adapter.supports_rollback());
    }

    #[tokio::test]
    async fn test_bad_adapter_config_is_reported() {
        let mut local = entry("local", AdapterKind::Memory);
        local
            .config
            .insert("capabilities".to_string(), Value::from("everything"));
        let err = build_registry(&settings(vec![local])).await.err().unwrap();
        assert!(matches!(err, StartupError::AdapterConfig { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_adapter_names_fail() {
        let err = build_registry(&settings(vec![
            entry("a", AdapterKind::Memory),
            entry("a", AdapterKind::Overlay),
        ]))
        .await
        .err()
        .unwrap();
        assert!(matches!(
            err,
            StartupError::Registry(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn test_application_lifecycle() {
        let app = Application::build(settings(vec![entry("local", AdapterKind::Memory)]))
            .await
            .unwrap();
        app.start().await;
        assert!(app.registry.is_health_loop_running().await);
        assert!(app.adapter_config("local").is_some());

        app.package_content.put("pkg", b"bytes").await.unwrap();
        app.shutdown().await.unwrap();
        assert!(app.registry.list().await.is_empty());
        assert!(app.subscriptions.ping().await.is_err());
    }
}
