//! Adapter Registry
//!
//! Name-keyed set of live adapters with their metadata, a default-adapter slot and a
//! background health loop. All state sits behind one reader/writer lock; adapter calls
//! (health probes, close) are always made with the lock released.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::adapters::{Adapter, Capability};

mod errors;
mod health;
mod metadata;

pub use errors::RegistryError;
pub use metadata::{HealthTransition, PluginMetadata};

use health::HealthTask;

pub type RegistryResult<T> = Result<T, RegistryError>;

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub health_check_interval: Duration,
    /// Per-probe deadline, independent of the interval.
    pub health_check_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(5),
        }
    }
}

struct Entry {
    adapter: Arc<dyn Adapter>,
    metadata: PluginMetadata,
    generation: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Entry>,
    default_name: Option<String>,
    next_generation: u64,
}

impl RegistryState {
    fn entry_mut(&mut self, name: &str) -> RegistryResult<&mut Entry> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn sorted_entries(&self) -> Vec<&Entry> {
        let mut entries = self.entries.values().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        entries
    }
}

/// State shared with the health loop task.
pub(crate) struct Shared {
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    transitions: broadcast::Sender<HealthTransition>,
}

pub struct Registry {
    shared: Arc<Shared>,
    health_task: Mutex<Option<HealthTask>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                state: RwLock::new(RegistryState::default()),
                transitions,
            }),
            health_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.shared.config
    }

    /// Registers an adapter under `name` after one bounded health probe. An unhealthy
    /// probe is recorded in the metadata; only a name collision fails registration.
    #[tracing::instrument(name = "Register adapter", skip(self, adapter, config))]
    pub async fn register(
        &self,
        name: &str,
        adapter_type: &str,
        adapter: Arc<dyn Adapter>,
        config: HashMap<String, Value>,
        is_default: bool,
    ) -> RegistryResult<()> {
        if self.shared.state.read().await.entries.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }

        let outcome = health::probe(
            adapter.as_ref(),
            self.shared.config.health_check_timeout,
            &CancellationToken::new(),
        )
        .await;
        let now = chrono::Utc::now();
        if let Err(err) = &outcome {
            tracing::warn!(adapter = %name, "Initial health check failed: {}", err);
        }

        let mut metadata = PluginMetadata {
            name: name.to_string(),
            adapter_type: adapter_type.to_string(),
            version: adapter.version().to_string(),
            enabled: true,
            default: false,
            capabilities: adapter.capabilities(),
            registered_at: now,
            last_health_check: Some(now),
            healthy: outcome.is_ok(),
            health_error: outcome.err(),
            config,
        };

        let mut state = self.shared.state.write().await;
        // Re-check: the probe ran without the lock.
        if state.entries.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        if is_default {
            metadata.default = true;
            if let Some(previous) = state.default_name.take() {
                if let Some(entry) = state.entries.get_mut(&previous) {
                    entry.metadata.default = false;
                }
            }
            state.default_name = Some(name.to_string());
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.entries.insert(
            name.to_string(),
            Entry {
                adapter,
                metadata,
                generation,
            },
        );

        tracing::info!(adapter = %name, default = is_default, "Adapter registered");
        Ok(())
    }

    /// Removes the adapter and closes it. A close failure is logged, not returned.
    #[tracing::instrument(name = "Unregister adapter", skip(self))]
    pub async fn unregister(&self, name: &str) -> RegistryResult<()> {
        let entry = {
            let mut state = self.shared.state.write().await;
            let entry = state
                .entries
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            if state.default_name.as_deref() == Some(name) {
                state.default_name = None;
            }
            entry
        };

        if let Err(err) = entry.adapter.close().await {
            tracing::error!(adapter = %name, "Failed to close adapter: {}", err);
        }
        tracing::info!(adapter = %name, "Adapter unregistered");
        Ok(())
    }

    pub async fn get(&self, name: &str) -> RegistryResult<Arc<dyn Adapter>> {
        self.shared
            .state
            .read()
            .await
            .entries
            .get(name)
            .map(|entry| entry.adapter.clone())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub async fn get_default(&self) -> Option<Arc<dyn Adapter>> {
        let state = self.shared.state.read().await;
        let name = state.default_name.as_ref()?;
        state.entries.get(name).map(|entry| entry.adapter.clone())
    }

    pub async fn get_default_name(&self) -> Option<String> {
        self.shared.state.read().await.default_name.clone()
    }

    pub async fn get_metadata(&self, name: &str) -> RegistryResult<PluginMetadata> {
        self.shared
            .state
            .read()
            .await
            .entries
            .get(name)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All adapters, ordered by registration name.
    pub async fn list(&self) -> Vec<Arc<dyn Adapter>> {
        self.select(|_| true).await
    }

    pub async fn list_metadata(&self) -> Vec<PluginMetadata> {
        let state = self.shared.state.read().await;
        state
            .sorted_entries()
            .into_iter()
            .map(|entry| entry.metadata.clone())
            .collect()
    }

    /// Enabled adapters whose last probe succeeded.
    pub async fn list_healthy(&self) -> Vec<Arc<dyn Adapter>> {
        self.select(|metadata| metadata.enabled && metadata.healthy)
            .await
    }

    pub async fn find_by_capability(&self, capability: Capability) -> Vec<Arc<dyn Adapter>> {
        self.select(|metadata| {
            metadata.enabled && metadata.healthy && metadata.has_capability(capability)
        })
        .await
    }

    /// Enabled adapters of `adapter_type`, regardless of health.
    pub async fn find_by_type(&self, adapter_type: &str) -> Vec<Arc<dyn Adapter>> {
        self.select(|metadata| metadata.enabled && metadata.adapter_type == adapter_type)
            .await
    }

    async fn select<F>(&self, predicate: F) -> Vec<Arc<dyn Adapter>>
    where
        F: Fn(&PluginMetadata) -> bool,
    {
        let state = self.shared.state.read().await;
        state
            .sorted_entries()
            .into_iter()
            .filter(|entry| predicate(&entry.metadata))
            .map(|entry| entry.adapter.clone())
            .collect()
    }

    pub async fn enable(&self, name: &str) -> RegistryResult<()> {
        self.set_enabled(name, true).await
    }

    pub async fn disable(&self, name: &str) -> RegistryResult<()> {
        self.set_enabled(name, false).await
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> RegistryResult<()> {
        let mut state = self.shared.state.write().await;
        state.entry_mut(name)?.metadata.enabled = enabled;
        tracing::info!(adapter = %name, enabled, "Adapter availability changed");
        Ok(())
    }

    pub async fn set_default(&self, name: &str) -> RegistryResult<()> {
        let mut state = self.shared.state.write().await;
        state.entry_mut(name)?.metadata.default = true;

        if let Some(previous) = state.default_name.replace(name.to_string()) {
            if previous != name {
                if let Some(entry) = state.entries.get_mut(&previous) {
                    entry.metadata.default = false;
                }
            }
        }
        tracing::info!(adapter = %name, "Default adapter set");
        Ok(())
    }

    /// Receives a `HealthTransition` for every flip recorded after subscribing.
    pub fn subscribe_health(&self) -> broadcast::Receiver<HealthTransition> {
        self.shared.transitions.subscribe()
    }

    /// Runs one health-check pass immediately and returns the transitions it recorded.
    pub async fn run_health_checks(&self) -> Vec<HealthTransition> {
        self.shared
            .run_health_checks(&CancellationToken::new())
            .await
    }

    /// Starts the periodic health loop. Does nothing if it is already running.
    pub async fn start_health_checks(&self) {
        let mut task = self.health_task.lock().await;
        if task.is_some() {
            tracing::debug!("Health check loop already running");
            return;
        }
        if self.shared.config.health_check_interval.is_zero() {
            tracing::warn!("Health check interval is zero, periodic checks disabled");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = health::spawn(self.shared.clone(), cancel.clone());
        *task = Some(HealthTask { cancel, handle });
        tracing::info!(
            interval = ?self.shared.config.health_check_interval,
            timeout = ?self.shared.config.health_check_timeout,
            "Health check loop started"
        );
    }

    /// Signals the health loop to stop and waits for it to exit. Stopping a loop that
    /// is not running is a no-op.
    pub async fn stop_health_checks(&self) {
        let task = self.health_task.lock().await.take();
        let Some(task) = task else {
            return;
        };
        task.cancel.cancel();
        if let Err(err) = task.handle.await {
            tracing::error!("Health check loop ended abnormally: {}", err);
        }
    }

    pub async fn is_health_loop_running(&self) -> bool {
        self.health_task.lock().await.is_some()
    }

    /// Stops the health loop, closes every adapter and empties the registry. Every
    /// adapter's close is attempted; the last failure is returned.
    #[tracing::instrument(name = "Close registry", skip(self))]
    pub async fn close(&self) -> RegistryResult<()> {
        self.stop_health_checks().await;

        let entries = {
            let mut state = self.shared.state.write().await;
            state.default_name = None;
            let mut entries = state.entries.drain().collect::<Vec<_>>();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };

        let mut last_error = None;
        for (name, entry) in entries {
            if let Err(err) = entry.adapter.close().await {
                tracing::error!(adapter = %name, "Failed to close adapter: {}", err);
                last_error = Some(RegistryError::Close { name, source: err });
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
