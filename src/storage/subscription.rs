use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{StoreError, StoreResult};
use crate::models::{Deployment, DeploymentStatus};

const KIND: &str = "subscription";

/// Narrows which deployment events a subscriber receives. Empty fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub statuses: Vec<DeploymentStatus>,
}

impl SubscriptionFilter {
    pub fn matches(&self, deployment: &Deployment) -> bool {
        let namespace_ok = self
            .namespace
            .as_deref()
            .map_or(true, |ns| ns.is_empty() || ns == deployment.namespace);
        let id_ok = self
            .deployment_id
            .as_deref()
            .map_or(true, |id| id == deployment.id);
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&deployment.status);
        namespace_ok && id_ok && status_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub callback_url: String,
    #[serde(default)]
    pub consumer_subscription_id: Option<String>,
    #[serde(default)]
    pub filter: SubscriptionFilter,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(callback_url: impl Into<String>, filter: SubscriptionFilter) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            callback_url: callback_url.into(),
            consumer_subscription_id: None,
            filter,
            created_at: Utc::now(),
        }
    }
}

/// Every value returned is an owned copy of the stored one.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, subscription: &Subscription) -> StoreResult<Subscription>;
    async fn get(&self, id: &str) -> StoreResult<Subscription>;
    /// Ordered by creation time.
    async fn list(&self) -> StoreResult<Vec<Subscription>>;
    async fn update(&self, subscription: &Subscription) -> StoreResult<Subscription>;
    async fn delete(&self, id: &str) -> StoreResult<()>;
    async fn ping(&self) -> StoreResult<()>;
    async fn close(&self) -> StoreResult<()>;
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: RwLock<HashMap<String, Subscription>>,
    closed: AtomicBool,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create(&self, subscription: &Subscription) -> StoreResult<Subscription> {
        self.ensure_open()?;
        let mut stored = subscription.clone();
        if stored.id.is_empty() {
            stored.id = uuid::Uuid::new_v4().to_string();
        }

        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.contains_key(&stored.id) {
            return Err(StoreError::AlreadyExists {
                kind: KIND,
                id: stored.id,
            });
        }
        subscriptions.insert(stored.id.clone(), stored.clone());
        tracing::debug!(subscription_id = %stored.id, "Subscription created");
        Ok(stored)
    }

    async fn get(&self, id: &str) -> StoreResult<Subscription> {
        self.ensure_open()?;
        self.subscriptions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: KIND,
                id: id.to_string(),
            })
    }

    async fn list(&self) -> StoreResult<Vec<Subscription>> {
        self.ensure_open()?;
        let mut subscriptions = self
            .subscriptions
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        subscriptions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(subscriptions)
    }

    /// Replaces everything except `created_at`.
    async fn update(&self, subscription: &Subscription) -> StoreResult<Subscription> {
        self.ensure_open()?;
        let mut subscriptions = self.subscriptions.write().await;
        let existing = subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| StoreError::NotFound {
                kind: KIND,
                id: subscription.id.clone(),
            })?;
        let created_at = existing.created_at;
        *existing = subscription.clone();
        existing.created_at = created_at;
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.ensure_open()?;
        match self.subscriptions.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                kind: KIND,
                id: id.to_string(),
            }),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.subscriptions.write().await.clear();
        Ok(())
    }
}
