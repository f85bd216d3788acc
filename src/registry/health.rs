use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::metadata::HealthTransition;
use super::Shared;
use crate::adapters::Adapter;

/// Handle on the running health loop.
pub(super) struct HealthTask {
    pub(super) cancel: CancellationToken,
    pub(super) handle: JoinHandle<()>,
}

/// One bounded probe. The child token is cancelled when the deadline passes so
/// adapters that watch it can abandon in-flight I/O.
pub(super) async fn probe(
    adapter: &dyn Adapter,
    limit: Duration,
    parent: &CancellationToken,
) -> Result<(), String> {
    let cancel = parent.child_token();
    match timeout(limit, adapter.health(&cancel)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => {
            cancel.cancel();
            Err(format!("health check timed out after {:?}", limit))
        }
    }
}

impl Shared {
    /// Probes every registered adapter once, without holding the state lock while
    /// probing, and records the results.
    pub(super) async fn run_health_checks(&self, cancel: &CancellationToken) -> Vec<HealthTransition> {
        let targets = {
            let state = self.state.read().await;
            state
                .entries
                .iter()
                .map(|(name, entry)| (name.clone(), entry.generation, entry.adapter.clone()))
                .collect::<Vec<_>>()
        };
        if targets.is_empty() {
            return Vec::new();
        }

        let limit = self.config.health_check_timeout;
        let results = join_all(targets.into_iter().map(|(name, generation, adapter)| async move {
            let outcome = probe(adapter.as_ref(), limit, cancel).await;
            (name, generation, outcome)
        }))
        .await;

        let now = chrono::Utc::now();
        let mut transitions = Vec::new();
        {
            let mut state = self.state.write().await;
            for (name, generation, outcome) in results {
                // Unregistered or replaced while the probe was in flight.
                let Some(entry) = state.entries.get_mut(&name) else {
                    continue;
                };
                if entry.generation != generation {
                    continue;
                }

                let healthy = outcome.is_ok();
                let was_healthy = entry.metadata.healthy;
                entry.metadata.last_health_check = Some(now);
                entry.metadata.healthy = healthy;
                entry.metadata.health_error = outcome.err();

                if was_healthy != healthy {
                    transitions.push(HealthTransition {
                        name,
                        healthy,
                        error: entry.metadata.health_error.clone(),
                        at: now,
                    });
                }
            }
        }

        for transition in &transitions {
            if transition.healthy {
                tracing::info!(adapter = %transition.name, "Adapter recovered");
            } else {
                tracing::warn!(
                    adapter = %transition.name,
                    error = transition.error.as_deref().unwrap_or_default(),
                    "Adapter became unhealthy"
                );
            }
            // No subscribers is not an error.
            let _ = self.transitions.send(transition.clone());
        }
        transitions
    }
}

pub(super) fn spawn(shared: Arc<Shared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(shared.config.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; registration already probed.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = shared.run_health_checks(&cancel) => {}
                    }
                }
            }
        }
        tracing::debug!("Health check loop stopped");
    })
}
