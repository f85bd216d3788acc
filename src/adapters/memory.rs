//! In-process release manager.
//!
//! Keeps packages, deployments, a revision log and log lines in memory. The declared
//! capability set decides which lifecycle operations are accepted, and the backend can be
//! marked unavailable to simulate an outage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::status::build_status_detail;
use super::validation::{validate_name, validate_package_version, validate_path_extensions};
use super::{
    ensure_active, AdapterError, AdapterMetadata, AdapterResult, Capability, CapabilityChecker,
    DeploymentManager, DeploymentOperator, Lifecycle, PackageManager,
};
use crate::models::{
    Deployment, DeploymentHistory, DeploymentPackage, DeploymentRequest, DeploymentRevision,
    DeploymentStatus, DeploymentStatusDetail, DeploymentUpdate, Filter, LogOptions, PackageUpload,
};

pub const MEMORY_ADAPTER_VERSION: &str = "1.0.0";
const DEFAULT_NAMESPACE: &str = "default";
const REPLICAS_EXTENSION: &str = "replicas";

#[derive(Debug, Clone)]
struct RevisionSnapshot {
    revision: DeploymentRevision,
    extensions: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
struct LogLine {
    at: DateTime<Utc>,
    message: String,
}

#[derive(Debug)]
struct Release {
    deployment: Deployment,
    revisions: Vec<RevisionSnapshot>,
    logs: Vec<LogLine>,
}

impl Release {
    fn record_revision(&mut self, description: &str) {
        let revision = self.revisions.len() as u64 + 1;
        self.revisions.push(RevisionSnapshot {
            revision: DeploymentRevision {
                revision,
                version: self.deployment.version,
                package_id: self.deployment.package_id.clone(),
                status: self.deployment.status,
                deployed_at: self.deployment.updated_at,
                description: description.to_string(),
            },
            extensions: self.deployment.extensions.clone(),
        });
    }

    fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogLine {
            at: Utc::now(),
            message: message.into(),
        });
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    packages: BTreeMap<String, DeploymentPackage>,
    releases: BTreeMap<String, Release>,
}

pub struct MemoryAdapter {
    name: String,
    capabilities: Vec<Capability>,
    state: RwLock<MemoryState>,
    available: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MemoryAdapter {
    /// Every capability except GitOps.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capabilities(
            name,
            vec![
                Capability::PackageManagement,
                Capability::DeploymentLifecycle,
                Capability::Rollback,
                Capability::Scaling,
                Capability::HealthChecks,
            ],
        )
    }

    pub fn with_capabilities(name: impl Into<String>, mut capabilities: Vec<Capability>) -> Self {
        capabilities.sort();
        capabilities.dedup();
        Self {
            name: name.into(),
            capabilities,
            state: RwLock::new(MemoryState::default()),
            available: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Simulates the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn check_backend(&self) -> AdapterResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::ConnectionFailed(format!(
                "adapter {} is closed",
                self.name
            )));
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(AdapterError::ConnectionFailed(format!(
                "backend for {} is unreachable",
                self.name
            )));
        }
        Ok(())
    }

    fn require(&self, capability: Capability, operation: &'static str) -> AdapterResult<()> {
        if self.capabilities.contains(&capability) {
            Ok(())
        } else {
            Err(AdapterError::not_supported(&self.name, operation))
        }
    }
}

impl AdapterMetadata for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        MEMORY_ADAPTER_VERSION
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }
}

impl CapabilityChecker for MemoryAdapter {}

#[async_trait]
impl PackageManager for MemoryAdapter {
    async fn list_deployment_packages(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<DeploymentPackage>> {
        ensure_active(cancel)?;
        self.check_backend()?;

        let state = self.state.read().await;
        let mut packages = state.packages.values().cloned().collect::<Vec<_>>();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uploaded_at.cmp(&b.uploaded_at)));
        Ok(filter.paginate(packages))
    }

    async fn get_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentPackage> {
        ensure_active(cancel)?;
        self.check_backend()?;

        self.state
            .read()
            .await
            .packages
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::package_not_found(id))
    }

    #[tracing::instrument(name = "Upload package", skip(self, cancel, upload), fields(adapter = %self.name, package = %upload.name))]
    async fn upload_deployment_package(
        &self,
        cancel: &CancellationToken,
        upload: &PackageUpload,
    ) -> AdapterResult<DeploymentPackage> {
        ensure_active(cancel)?;
        validate_name(&upload.name)?;
        validate_package_version(&upload.version)?;
        validate_path_extensions(&upload.extensions)?;
        self.check_backend()?;

        let mut state = self.state.write().await;
        let duplicate = state
            .packages
            .values()
            .any(|p| p.name == upload.name && p.version == upload.version);
        if duplicate {
            return Err(AdapterError::VersionExists {
                name: upload.name.clone(),
                version: upload.version.clone(),
            });
        }

        let package = DeploymentPackage::from_upload(upload);
        state.packages.insert(package.id.clone(), package.clone());
        tracing::info!(package_id = %package.id, "Package uploaded");
        Ok(package)
    }

    async fn delete_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<()> {
        ensure_active(cancel)?;
        self.check_backend()?;

        let mut state = self.state.write().await;
        let in_use = state
            .releases
            .values()
            .any(|release| release.deployment.package_id == id);
        if in_use {
            return Err(AdapterError::InvalidInput(format!(
                "package {} is referenced by a deployment",
                id
            )));
        }
        state
            .packages
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AdapterError::package_not_found(id))
    }
}

#[async_trait]
impl DeploymentManager for MemoryAdapter {
    async fn list_deployments(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<Deployment>> {
        ensure_active(cancel)?;
        self.check_backend()?;

        let state = self.state.read().await;
        let deployments = state
            .releases
            .values()
            .map(|release| release.deployment.clone())
            .collect::<Vec<_>>();
        Ok(filter.apply(deployments))
    }

    async fn get_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<Deployment> {
        ensure_active(cancel)?;
        self.check_backend()?;

        self.state
            .read()
            .await
            .releases
            .get(id)
            .map(|release| release.deployment.clone())
            .ok_or_else(|| AdapterError::deployment_not_found(id))
    }

    #[tracing::instrument(name = "Create deployment", skip(self, cancel, request), fields(adapter = %self.name, deployment = %request.name))]
    async fn create_deployment(
        &self,
        cancel: &CancellationToken,
        request: &DeploymentRequest,
    ) -> AdapterResult<Deployment> {
        ensure_active(cancel)?;
        validate_name(&request.name)?;
        if !request.namespace.is_empty() {
            validate_name(&request.namespace)?;
        }
        validate_path_extensions(&request.extensions)?;
        self.check_backend()?;

        let mut state = self.state.write().await;
        if !state.packages.contains_key(&request.package_id) {
            return Err(AdapterError::package_not_found(&request.package_id));
        }
        if state.releases.contains_key(&request.name) {
            return Err(AdapterError::AlreadyExists {
                kind: "deployment",
                id: request.name.clone(),
            });
        }

        let now = Utc::now();
        let namespace = if request.namespace.is_empty() {
            DEFAULT_NAMESPACE.to_string()
        } else {
            request.namespace.clone()
        };
        let deployment = Deployment {
            id: request.name.clone(),
            name: request.name.clone(),
            namespace,
            package_id: request.package_id.clone(),
            status: DeploymentStatus::Deployed,
            version: 1,
            description: request.description.clone(),
            created_at: now,
            updated_at: now,
            extensions: request.extensions.clone(),
        };

        let mut release = Release {
            deployment: deployment.clone(),
            revisions: Vec::new(),
            logs: Vec::new(),
        };
        release.log(format!("installing package {}", deployment.package_id));
        release.record_revision("install");
        release.log("install complete");
        state.releases.insert(deployment.id.clone(), release);

        tracing::info!("Deployment created");
        Ok(deployment)
    }

    #[tracing::instrument(name = "Update deployment", skip(self, cancel, update), fields(adapter = %self.name))]
    async fn update_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        update: &DeploymentUpdate,
    ) -> AdapterResult<Deployment> {
        ensure_active(cancel)?;
        if let Some(extensions) = &update.extensions {
            validate_path_extensions(extensions)?;
        }
        self.check_backend()?;

        let mut state = self.state.write().await;
        if let Some(package_id) = &update.package_id {
            if !state.packages.contains_key(package_id) {
                return Err(AdapterError::package_not_found(package_id));
            }
        }
        let release = state
            .releases
            .get_mut(id)
            .ok_or_else(|| AdapterError::deployment_not_found(id))?;

        release.deployment.apply_update(update);
        release.deployment.status = DeploymentStatus::Deployed;
        release.record_revision("upgrade");
        release.log(format!(
            "upgraded to version {} (package {})",
            release.deployment.version, release.deployment.package_id
        ));
        Ok(release.deployment.clone())
    }

    async fn delete_deployment(&self, cancel: &CancellationToken, id: &str) -> AdapterResult<()> {
        ensure_active(cancel)?;
        self.check_backend()?;

        let mut state = self.state.write().await;
        match state.releases.remove(id) {
            Some(_) => {
                tracing::info!(adapter = %self.name, deployment = %id, "Deployment deleted");
                Ok(())
            }
            None => Err(AdapterError::deployment_not_found(id)),
        }
    }
}

#[async_trait]
impl DeploymentOperator for MemoryAdapter {
    async fn scale_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        replicas: u32,
    ) -> AdapterResult<()> {
        ensure_active(cancel)?;
        self.require(Capability::Scaling, "scale")?;
        self.check_backend()?;

        let mut state = self.state.write().await;
        let release = state
            .releases
            .get_mut(id)
            .ok_or_else(|| AdapterError::deployment_not_found(id))?;
        release
            .deployment
            .extensions
            .insert(REPLICAS_EXTENSION.to_string(), Value::from(replicas));
        release.deployment.touch();
        release.log(format!("scaled to {} replicas", replicas));
        Ok(())
    }

    #[tracing::instrument(name = "Rollback deployment", skip(self, cancel), fields(adapter = %self.name))]
    async fn rollback_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
        revision: u64,
    ) -> AdapterResult<()> {
        ensure_active(cancel)?;
        self.require(Capability::Rollback, "rollback")?;
        self.check_backend()?;

        let mut state = self.state.write().await;
        let release = state
            .releases
            .get_mut(id)
            .ok_or_else(|| AdapterError::deployment_not_found(id))?;

        let target = if revision == 0 {
            let count = release.revisions.len();
            if count < 2 {
                return Err(AdapterError::InvalidInput(format!(
                    "deployment {} has no previous revision",
                    id
                )));
            }
            release.revisions[count - 2].clone()
        } else {
            release
                .revisions
                .iter()
                .find(|snapshot| snapshot.revision.revision == revision)
                .cloned()
                .ok_or_else(|| AdapterError::NotFound {
                    kind: "revision",
                    id: format!("{}@{}", id, revision),
                })?
        };

        release.log(format!("rolling back to revision {}", target.revision.revision));

        release.deployment.package_id = target.revision.package_id.clone();
        release.deployment.extensions = target.extensions.clone();
        release.deployment.touch();
        release.deployment.version += 1;
        release.deployment.status = DeploymentStatus::Deployed;
        release.record_revision(&format!("rollback to revision {}", target.revision.revision));
        release.log("rollback complete");
        Ok(())
    }

    async fn get_deployment_status(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentStatusDetail> {
        let deployment = self.get_deployment(cancel, id).await?;
        Ok(build_status_detail(&deployment))
    }

    async fn get_deployment_history(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentHistory> {
        ensure_active(cancel)?;
        self.check_backend()?;

        let state = self.state.read().await;
        let release = state
            .releases
            .get(id)
            .ok_or_else(|| AdapterError::deployment_not_found(id))?;
        Ok(DeploymentHistory {
            deployment_id: id.to_string(),
            revisions: release
                .revisions
                .iter()
                .map(|snapshot| snapshot.revision.clone())
                .collect(),
        })
    }

    async fn get_deployment_logs(
        &self,
        cancel: &CancellationToken,
        id: &str,
        options: &LogOptions,
    ) -> AdapterResult<Vec<u8>> {
        ensure_active(cancel)?;
        self.check_backend()?;

        let state = self.state.read().await;
        let release = state
            .releases
            .get(id)
            .ok_or_else(|| AdapterError::deployment_not_found(id))?;

        let lines = release
            .logs
            .iter()
            .filter(|line| options.since.map_or(true, |since| line.at >= since))
            .collect::<Vec<_>>();
        let skip = options
            .tail_lines
            .map_or(0, |tail| lines.len().saturating_sub(tail));

        let mut output = String::new();
        for line in lines.into_iter().skip(skip) {
            output.push_str(&format!("{} {}\n", line.at.to_rfc3339(), line.message));
        }
        Ok(output.into_bytes())
    }
}

#[async_trait]
impl Lifecycle for MemoryAdapter {
    async fn health(&self, cancel: &CancellationToken) -> AdapterResult<()> {
        ensure_active(cancel)?;
        self.check_backend()
    }

    async fn close(&self) -> AdapterResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
