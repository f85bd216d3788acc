//! Declarative-overlay adapter.
//!
//! Overlay appliers have no deployment ledger of their own, so this adapter keeps one inside
//! the target platform: every logical deployment is a single labeled record named
//! `dms-deployment-<name>` in a tracking namespace, and packages are records named
//! `dms-package-<id>`. Get/Update/Delete address records directly by that name, no
//! secondary index is needed.
//!
//! The backend connection is established lazily on first use, exactly once; a failed
//! initialization is cached and returned to every later caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;

use super::status::build_status_detail;
use super::validation::{
    validate_name, validate_package_version, validate_path_extensions, validate_relative_path,
};
use super::{
    ensure_active, AdapterError, AdapterMetadata, AdapterResult, Capability, CapabilityChecker,
    DeploymentManager, DeploymentOperator, Lifecycle, PackageManager,
};
use crate::models::{
    Deployment, DeploymentHistory, DeploymentPackage, DeploymentRequest, DeploymentRevision,
    DeploymentStatus, DeploymentStatusDetail, DeploymentUpdate, Filter, LogOptions, PackageUpload,
};

mod file_client;
mod memory_client;
pub mod record;

pub use file_client::FileRecordClient;
pub use memory_client::MemoryRecordClient;
pub use record::{Record, RecordClient};

use record::{
    deployment_record_name, deployment_to_record, kind_selector, package_record_name,
    package_to_record, record_to_deployment, record_to_package, KIND_DEPLOYMENT, KIND_PACKAGE,
    LABEL_PACKAGE_NAME,
};

pub const OVERLAY_ADAPTER_VERSION: &str = "1.0.0";
pub const OVERLAY_PATH_EXTENSION: &str = "overlayPath";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Namespace holding the tracking records.
    #[serde(default = "OverlayConfig::default_tracking_namespace")]
    pub tracking_namespace: String,
    /// Value of the managed-by label on every record this adapter owns.
    #[serde(default = "OverlayConfig::default_manager")]
    pub manager: String,
    /// Namespace used when a request does not name one.
    #[serde(default = "OverlayConfig::default_target_namespace")]
    pub default_namespace: String,
    /// Overlay used when a request carries no `overlayPath` extension.
    #[serde(default)]
    pub default_overlay_path: Option<String>,
}

impl OverlayConfig {
    fn default_tracking_namespace() -> String {
        "dms-system".to_string()
    }

    fn default_manager() -> String {
        "dms-gateway".to_string()
    }

    fn default_target_namespace() -> String {
        "default".to_string()
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            tracking_namespace: Self::default_tracking_namespace(),
            manager: Self::default_manager(),
            default_namespace: Self::default_target_namespace(),
            default_overlay_path: None,
        }
    }
}

pub struct OverlayAdapter {
    name: String,
    config: OverlayConfig,
    client: Arc<dyn RecordClient>,
    init: OnceCell<AdapterResult<()>>,
    // Serializes read-modify-write cycles on records.
    write_lock: Mutex<()>,
}

impl OverlayAdapter {
    pub fn new(name: impl Into<String>, config: OverlayConfig, client: Arc<dyn RecordClient>) -> Self {
        Self {
            name: name.into(),
            config,
            client,
            init: OnceCell::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    async fn backend(&self) -> AdapterResult<&dyn RecordClient> {
        let outcome = self
            .init
            .get_or_init(|| async {
                let outcome = self.client.initialize().await;
                match &outcome {
                    Ok(()) => tracing::info!(adapter = %self.name, "Record backend initialized"),
                    Err(err) => {
                        tracing::error!(adapter = %self.name, "Record backend initialization failed: {}", err)
                    }
                }
                outcome
            })
            .await;
        outcome.clone()?;
        Ok(self.client.as_ref())
    }

    fn namespace(&self) -> &str {
        &self.config.tracking_namespace
    }

    fn to_record(&self, deployment: &Deployment) -> Record {
        deployment_to_record(deployment, self.namespace(), &self.config.manager, &self.name)
    }

    async fn load_deployment(&self, client: &dyn RecordClient, id: &str) -> AdapterResult<Deployment> {
        let record = client
            .get(self.namespace(), &deployment_record_name(id))
            .await?
            .filter(|record| record.kind() == Some(KIND_DEPLOYMENT))
            .ok_or_else(|| AdapterError::deployment_not_found(id))?;
        Ok(record_to_deployment(&record))
    }

    async fn require_package(&self, client: &dyn RecordClient, id: &str) -> AdapterResult<()> {
        client
            .get(self.namespace(), &package_record_name(id))
            .await?
            .filter(|record| record.kind() == Some(KIND_PACKAGE))
            .map(|_| ())
            .ok_or_else(|| AdapterError::package_not_found(id))
    }
}

impl AdapterMetadata for OverlayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        OVERLAY_ADAPTER_VERSION
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::PackageManagement,
            Capability::DeploymentLifecycle,
            Capability::HealthChecks,
        ]
    }
}

impl CapabilityChecker for OverlayAdapter {}

#[async_trait]
impl PackageManager for OverlayAdapter {
    async fn list_deployment_packages(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<DeploymentPackage>> {
        ensure_active(cancel)?;
        let client = self.backend().await?;

        let selector = kind_selector(&self.config.manager, KIND_PACKAGE);
        let mut packages = client
            .list(self.namespace(), &selector, None)
            .await?
            .iter()
            .map(record_to_package)
            .collect::<Vec<_>>();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uploaded_at.cmp(&b.uploaded_at)));
        Ok(filter.paginate(packages))
    }

    async fn get_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentPackage> {
        ensure_active(cancel)?;
        let client = self.backend().await?;

        client
            .get(self.namespace(), &package_record_name(id))
            .await?
            .filter(|record| record.kind() == Some(KIND_PACKAGE))
            .map(|record| record_to_package(&record))
            .ok_or_else(|| AdapterError::package_not_found(id))
    }

    #[tracing::instrument(name = "Upload overlay package", skip(self, cancel, upload), fields(adapter = %self.name, package = %upload.name))]
    async fn upload_deployment_package(
        &self,
        cancel: &CancellationToken,
        upload: &PackageUpload,
    ) -> AdapterResult<DeploymentPackage> {
        ensure_active(cancel)?;
        validate_name(&upload.name)?;
        validate_package_version(&upload.version)?;
        validate_path_extensions(&upload.extensions)?;
        let client = self.backend().await?;

        let _guard = self.write_lock.lock().await;
        let mut selector = kind_selector(&self.config.manager, KIND_PACKAGE);
        selector.insert(LABEL_PACKAGE_NAME.to_string(), upload.name.clone());
        let exists = client
            .list(self.namespace(), &selector, None)
            .await?
            .iter()
            .any(|record| record.data.get("version") == Some(&upload.version));
        if exists {
            return Err(AdapterError::VersionExists {
                name: upload.name.clone(),
                version: upload.version.clone(),
            });
        }

        let package = DeploymentPackage::from_upload(upload);
        let record = package_to_record(&package, self.namespace(), &self.config.manager, &self.name);
        client.create(&record).await?;
        tracing::info!(package_id = %package.id, "Package recorded");
        Ok(package)
    }

    async fn delete_deployment_package(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<()> {
        ensure_active(cancel)?;
        let client = self.backend().await?;

        let _guard = self.write_lock.lock().await;
        let selector = kind_selector(&self.config.manager, KIND_DEPLOYMENT);
        let in_use = client
            .list(self.namespace(), &selector, None)
            .await?
            .iter()
            .any(|record| record.data.get("packageId").map(String::as_str) == Some(id));
        if in_use {
            return Err(AdapterError::InvalidInput(format!(
                "package {} is referenced by a deployment",
                id
            )));
        }
        if client.delete(self.namespace(), &package_record_name(id)).await? {
            Ok(())
        } else {
            Err(AdapterError::package_not_found(id))
        }
    }
}

#[async_trait]
impl DeploymentManager for OverlayAdapter {
    async fn list_deployments(
        &self,
        cancel: &CancellationToken,
        filter: &Filter,
    ) -> AdapterResult<Vec<Deployment>> {
        ensure_active(cancel)?;
        let client = self.backend().await?;

        let selector = kind_selector(&self.config.manager, KIND_DEPLOYMENT);
        let deployments = client
            .list(self.namespace(), &selector, None)
            .await?
            .iter()
            .map(record_to_deployment)
            .collect::<Vec<_>>();
        Ok(filter.apply(deployments))
    }

    async fn get_deployment(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<Deployment> {
        ensure_active(cancel)?;
        let client = self.backend().await?;
        self.load_deployment(client, id).await
    }

    #[tracing::instrument(name = "Create overlay deployment", skip(self, cancel, request), fields(adapter = %self.name, deployment = %request.name))]
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
        if let Some(path) = &self.config.default_overlay_path {
            validate_relative_path(path)?;
        }
        let client = self.backend().await?;

        let now = chrono::Utc::now();
        let mut extensions = request.extensions.clone();
        if let Some(path) = &self.config.default_overlay_path {
            extensions
                .entry(OVERLAY_PATH_EXTENSION.to_string())
                .or_insert_with(|| serde_json::Value::from(path.clone()));
        }
        let deployment = Deployment {
            id: request.name.clone(),
            name: request.name.clone(),
            namespace: if request.namespace.is_empty() {
                self.config.default_namespace.clone()
            } else {
                request.namespace.clone()
            },
            package_id: request.package_id.clone(),
            status: DeploymentStatus::Deployed,
            version: 1,
            description: request.description.clone(),
            created_at: now,
            updated_at: now,
            extensions,
        };

        let _guard = self.write_lock.lock().await;
        self.require_package(client, &request.package_id).await?;
        match client.create(&self.to_record(&deployment)).await {
            Ok(()) => {
                tracing::info!("Deployment record created");
                Ok(deployment)
            }
            Err(AdapterError::AlreadyExists { .. }) => Err(AdapterError::AlreadyExists {
                kind: "deployment",
                id: request.name.clone(),
            }),
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(name = "Update overlay deployment", skip(self, cancel, update), fields(adapter = %self.name))]
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
        let client = self.backend().await?;

        let _guard = self.write_lock.lock().await;
        if let Some(package_id) = &update.package_id {
            self.require_package(client, package_id).await?;
        }
        let mut deployment = self.load_deployment(client, id).await?;
        deployment.apply_update(update);

        match client.replace(&self.to_record(&deployment)).await {
            Ok(()) => Ok(deployment),
            Err(err) if err.is_not_found() => Err(AdapterError::deployment_not_found(id)),
            Err(err) => Err(err),
        }
    }

    async fn delete_deployment(&self, cancel: &CancellationToken, id: &str) -> AdapterResult<()> {
        ensure_active(cancel)?;
        let client = self.backend().await?;

        let _guard = self.write_lock.lock().await;
        if client.delete(self.namespace(), &deployment_record_name(id)).await? {
            tracing::info!(adapter = %self.name, deployment = %id, "Deployment record deleted");
            Ok(())
        } else {
            Err(AdapterError::deployment_not_found(id))
        }
    }
}

#[async_trait]
impl DeploymentOperator for OverlayAdapter {
    async fn scale_deployment(
        &self,
        cancel: &CancellationToken,
        _id: &str,
        _replicas: u32,
    ) -> AdapterResult<()> {
        ensure_active(cancel)?;
        Err(AdapterError::not_supported(&self.name, "scale"))
    }

    async fn rollback_deployment(
        &self,
        cancel: &CancellationToken,
        _id: &str,
        _revision: u64,
    ) -> AdapterResult<()> {
        ensure_active(cancel)?;
        Err(AdapterError::not_supported(&self.name, "rollback"))
    }

    async fn get_deployment_status(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentStatusDetail> {
        let deployment = self.get_deployment(cancel, id).await?;
        Ok(build_status_detail(&deployment))
    }

    /// Overlays keep no revisions; the history is the current state only.
    async fn get_deployment_history(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> AdapterResult<DeploymentHistory> {
        let deployment = self.get_deployment(cancel, id).await?;
        Ok(DeploymentHistory {
            deployment_id: deployment.id.clone(),
            revisions: vec![DeploymentRevision {
                revision: deployment.version,
                version: deployment.version,
                package_id: deployment.package_id.clone(),
                status: deployment.status,
                deployed_at: deployment.updated_at,
                description: deployment.description.clone(),
            }],
        })
    }

    async fn get_deployment_logs(
        &self,
        cancel: &CancellationToken,
        id: &str,
        options: &LogOptions,
    ) -> AdapterResult<Vec<u8>> {
        let deployment = self.get_deployment(cancel, id).await?;

        let mut lines = Vec::new();
        if options.since.map_or(true, |since| deployment.created_at >= since) {
            lines.push(format!(
                "{} created {} in {} from package {}",
                deployment.created_at.to_rfc3339(),
                deployment.name,
                deployment.namespace,
                deployment.package_id
            ));
        }
        if deployment.version > 1 && options.since.map_or(true, |since| deployment.updated_at >= since) {
            lines.push(format!(
                "{} updated to version {}",
                deployment.updated_at.to_rfc3339(),
                deployment.version
            ));
        }
        if let Some(overlay) = deployment.extension_str(OVERLAY_PATH_EXTENSION) {
            lines.push(format!("overlay {} status {}", overlay, deployment.status));
        }
        if let Some(tail) = options.tail_lines {
            let skip = lines.len().saturating_sub(tail);
            lines.drain(..skip);
        }

        let mut output = lines.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        Ok(output.into_bytes())
    }
}

#[async_trait]
impl Lifecycle for OverlayAdapter {
    async fn health(&self, cancel: &CancellationToken) -> AdapterResult<()> {
        ensure_active(cancel)?;
        let client = self.backend().await?;
        let selector: BTreeMap<String, String> = kind_selector(&self.config.manager, KIND_DEPLOYMENT);
        client.list(self.namespace(), &selector, Some(1)).await?;
        Ok(())
    }

    async fn close(&self) -> AdapterResult<()> {
        match self.init.get() {
            Some(Ok(())) => self.client.close().await,
            _ => Ok(()),
        }
    }
}
