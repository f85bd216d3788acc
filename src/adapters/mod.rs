//! Backend Adapters
//!
//! This module defines the contract every deployment backend implements (GitOps
//! controllers, overlay appliers, package managers, lifecycle managers) and ships
//! the built-in implementations.
//!
//! ## Architecture Pattern
//!
//! 1. The contract is split into small traits (`PackageManager`, `DeploymentManager`, ...)
//! 2. `Adapter` is their composition, implemented automatically for any type that has them all
//! 3. The registry stores `Arc<dyn Adapter>` → callers never depend on a concrete backend
//! 4. Operations a backend cannot perform return `OperationNotSupported`, never a silent success
//!
//! ## Usage
//!
//! ```ignore
//! let adapter: Arc<dyn Adapter> = registry.get_default().await.expect("default adapter");
//! let cancel = CancellationToken::new();
//! let deployment = adapter.create_deployment(&cancel, &request).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::models::{
    Deployment, DeploymentHistory, DeploymentPackage, DeploymentRequest, DeploymentStatusDetail,
    DeploymentUpdate, Filter, LogOptions, PackageUpload,
};

pub mod errors;
pub mod memory;
pub mod overlay;
pub mod status;
pub mod validation;

pub use errors::AdapterError;
pub use memory::MemoryAdapter;
pub use overlay::{FileRecordClient, MemoryRecordClient, OverlayAdapter, OverlayConfig, RecordClient};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Feature flags an adapter advertises once, for its whole lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    PackageManagement,
    DeploymentLifecycle,
    Rollback,
    Scaling,
    #[serde(rename = "gitops")]
    GitOps,
    HealthChecks,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::PackageManagement,
        Capability::DeploymentLifecycle,
        Capability::Rollback,
        Capability::Scaling,
        Capability::GitOps,
        Capability::HealthChecks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageManagement => "package-management",
            Self::DeploymentLifecycle => "deployment-lifecycle",
            Self::Rollback => "rollback",
            Self::Scaling => "scaling",
            Self::GitOps => "gitops",
            Self::HealthChecks => "health-checks",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fails with `Cancelled` once the caller's signal has fired.
/// Every operation calls this before touching its backend.
pub fn ensure_active(cancel: &CancellationToken) -> AdapterResult<()> {
    if cancel.is_cancelled() {
        Err(AdapterError::Cancelled)
    } else {
        Ok(())
    }
}

pub trait AdapterMetadata: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    fn capabilities(&self) -> Vec<Capability>;
}

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn list_deployment_packages(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<DeploymentPackage>>;

    async fn get_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentPackage>;

    async fn upload_deployment_package(
        &self,
        cancel: &CancellationToken,
        upload: &PackageUpload,
    ) -> AdapterResult<DeploymentPackage>;

    async fn delete_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<()>;
}

#[async_trait]
pub trait DeploymentManager: Send + Sync {
    async fn list_deployments(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<Deployment>>;

    async fn get_deployment(&self, cancel: &CancellationToken, id: &str)
        -> AdapterResult<Deployment>;

    /// Rejects an invalid name with `InvalidName` before any backend I/O.
    async fn create_deployment(
        &self,
        cancel: &CancellationToken,
        request: &DeploymentRequest,
    ) -> AdapterResult<Deployment>;

    async fn update_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        update: &DeploymentUpdate,
    ) -> AdapterResult<Deployment>;

    /// Not idempotent: deleting a missing deployment is `NotFound`.
    async fn delete_deployment(&self, cancel: &CancellationToken, id: &str) -> AdapterResult<()>;
}

#[async_trait]
pub trait DeploymentOperator: Send + Sync {
    async fn scale_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        replicas: u32,
    ) -> AdapterResult<()>;

    /// Revision 0 means "the revision before the current one".
    async fn rollback_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        revision: u64,
    ) -> AdapterResult<()>;

    async fn get_deployment_status(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentStatusDetail>;

    async fn get_deployment_history(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentHistory>;

    async fn get_deployment_logs(
        &self,
        cancel: &CancellationToken,
        id: &str,
        options: &LogOptions,
    ) -> AdapterResult<Vec<u8>>;
}

/// Derived from the declared capabilities unless a backend overrides it.
pub trait CapabilityChecker: AdapterMetadata {
    fn supports_rollback(&self) -> bool {
        self.capabilities().contains(&Capability::Rollback)
    }

    fn supports_scaling(&self) -> bool {
        self.capabilities().contains(&Capability::Scaling)
    }

    fn supports_gitops(&self) -> bool {
        self.capabilities().contains(&Capability::GitOps)
    }
}

#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// One lightweight, side-effect free backend probe.
    async fn health(&self, cancel: &CancellationToken) -> AdapterResult<()>;

    /// Releases backend handles. Safe to call before initialization ever completed.
    async fn close(&self) -> AdapterResult<()>;
}

/// The full adapter contract.
pub trait Adapter:
    AdapterMetadata + PackageManager + DeploymentManager + DeploymentOperator + CapabilityChecker + Lifecycle
{
}

impl<T> Adapter for T where
    T: AdapterMetadata
        + PackageManager
        + DeploymentManager
        + DeploymentOperator
        + CapabilityChecker
        + Lifecycle
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_wire_names() {
        assert_eq!(
            serde_json::to_string(&Capability::GitOps).unwrap(),
            "\"gitops\""
        );
        assert_eq!(
            serde_json::to_string(&Capability::PackageManagement).unwrap(),
            "\"package-management\""
        );
        for capability in Capability::ALL {
            let encoded = serde_json::to_string(&capability).unwrap();
            assert_eq!(encoded, format!("\"{}\"", capability.as_str()));
        }
    }

    #[test]
    fn test_ensure_active() {
        let cancel = CancellationToken::new();
        assert!(ensure_active(&cancel).is_ok());
        cancel.cancel();
        assert_eq!(ensure_active(&cancel), Err(AdapterError::Cancelled));
    }
}
