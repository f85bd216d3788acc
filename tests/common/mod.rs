#![allow(dead_code)]

use async_trait::async_trait;
use dms_gateway::adapters::{
    AdapterError, AdapterMetadata, AdapterResult, Capability, CapabilityChecker,
    DeploymentManager, DeploymentOperator, Lifecycle, MemoryAdapter, PackageManager,
};
use dms_gateway::models::{
    Deployment, DeploymentHistory, DeploymentPackage, DeploymentRequest, DeploymentStatusDetail,
    DeploymentUpdate, Filter, LogOptions, PackageUpload,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Memory adapter whose health probe can be made to hang and whose close can fail.
pub struct ScriptedAdapter {
    inner: MemoryAdapter,
    hang_health: AtomicBool,
    fail_close: bool,
    health_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryAdapter::new(name),
            hang_health: AtomicBool::new(false),
            fail_close: false,
            health_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_close(name: &str) -> Self {
        Self {
            fail_close: true,
            ..Self::new(name)
        }
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang_health.store(hang, Ordering::SeqCst);
    }

    pub fn set_available(&self, available: bool) {
        self.inner.set_available(available);
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl AdapterMetadata for ScriptedAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> &str {
        self.inner.version()
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.inner.capabilities()
    }
}

impl CapabilityChecker for ScriptedAdapter {}

#[async_trait]
impl PackageManager for ScriptedAdapter {
    async fn list_deployment_packages(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<DeploymentPackage>> {
        self.inner.list_deployment_packages(cancel, filter).await
    }

    async fn get_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentPackage> {
        self.inner.get_deployment_package(cancel, id).await
    }

    async fn upload_deployment_package(
        &self,
        cancel: &CancellationToken,
        upload: &PackageUpload,
    ) -> AdapterResult<DeploymentPackage> {
        self.inner.upload_deployment_package(cancel, upload).await
    }

    async fn delete_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<()> {
        self.inner.delete_deployment_package(cancel, id).await
    }
}

#[async_trait]
impl DeploymentManager for ScriptedAdapter {
    async fn list_deployments(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<Deployment>> {
        self.inner.list_deployments(cancel, filter).await
    }

    async fn get_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<Deployment> {
        self.inner.get_deployment(cancel, id).await
    }

    async fn create_deployment(
        &self,
        cancel: &CancellationToken,
        request: &DeploymentRequest,
    ) -> AdapterResult<Deployment> {
        self.inner.create_deployment(cancel, request).await
    }

    async fn update_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        update: &DeploymentUpdate,
    ) -> AdapterResult<Deployment> {
        self.inner.update_deployment(cancel, id, update).await
    }

    async fn delete_deployment(&self, cancel: &CancellationToken, id: &str) -> AdapterResult<()> {
        self.inner.delete_deployment(cancel, id).await
    }
}

#[async_trait]
impl DeploymentOperator for ScriptedAdapter {
    async fn scale_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        replicas: u32,
    ) -> AdapterResult<()> {
        self.inner.scale_deployment(cancel, id, replicas).await
    }

    async fn rollback_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        revision: u64,
    ) -> AdapterResult<()> {
        self.inner.rollback_deployment(cancel, id, revision).await
    }

    async fn get_deployment_status(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentStatusDetail> {
        self.inner.get_deployment_status(cancel, id).await
    }

    async fn get_deployment_history(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentHistory> {
        self.inner.get_deployment_history(cancel, id).await
    }

    async fn get_deployment_logs(
        &self,
        cancel: &CancellationToken,
        id: &str,
        options: &LogOptions,
    ) -> AdapterResult<Vec<u8>> {
        self.inner.get_deployment_logs(cancel, id, options).await
    }
}

#[async_trait]
impl Lifecycle for ScriptedAdapter {
    async fn health(&self, cancel: &CancellationToken) -> AdapterResult<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_health.load(Ordering::SeqCst) {
            // Only the caller's deadline ends this.
            std::future::pending::<()>().await;
        }
        self.inner.health(cancel).await
    }

    async fn close(&self) -> AdapterResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await?;
        if self.fail_close {
            return Err(AdapterError::Backend(format!(
                "{} refused to close",
                self.inner.name()
            )));
        }
        Ok(())
    }
}
