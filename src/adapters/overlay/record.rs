//! Labeled records stored inside the target platform, and the flat string encoding of
//! deployments and packages onto them.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::adapters::AdapterResult;
use crate::models::{Deployment, DeploymentPackage, DeploymentStatus};

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_KIND: &str = "dms.gateway/kind";
pub const LABEL_DEPLOYMENT_NAME: &str = "dms.gateway/deployment-name";
pub const LABEL_PACKAGE_NAME: &str = "dms.gateway/package-name";
pub const ANNOTATION_ADAPTER: &str = "dms.gateway/adapter";

pub const KIND_DEPLOYMENT: &str = "deployment";
pub const KIND_PACKAGE: &str = "package";

const DEPLOYMENT_PREFIX: &str = "dms-deployment-";
const PACKAGE_PREFIX: &str = "dms-package-";
const EXTENSION_PREFIX: &str = "ext.";

/// A namespaced, labeled key/value object (a ConfigMap in Kubernetes terms).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Record {
    pub fn matches(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.labels.get(key) == Some(value))
    }

    pub fn kind(&self) -> Option<&str> {
        self.labels.get(LABEL_KIND).map(String::as_str)
    }
}

/// Namespace-scoped record storage on the target platform.
#[async_trait]
pub trait RecordClient: Send + Sync {
    /// Establishes the backend connection. Called at most once per adapter.
    async fn initialize(&self) -> AdapterResult<()>;

    async fn get(&self, namespace: &str, name: &str) -> AdapterResult<Option<Record>>;

    /// Fails with `AlreadyExists` when a record with the same name exists.
    async fn create(&self, record: &Record) -> AdapterResult<()>;

    /// Fails with `NotFound` when the record does not exist.
    async fn replace(&self, record: &Record) -> AdapterResult<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, namespace: &str, name: &str) -> AdapterResult<bool>;

    /// Records whose labels contain every selector pair, ordered by name.
    async fn list(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        limit: Option<usize>,
    ) -> AdapterResult<Vec<Record>>;

    async fn close(&self) -> AdapterResult<()>;
}

pub fn deployment_record_name(deployment_name: &str) -> String {
    format!("{}{}", DEPLOYMENT_PREFIX, deployment_name)
}

pub fn package_record_name(package_id: &str) -> String {
    format!("{}{}", PACKAGE_PREFIX, package_id)
}

pub fn kind_selector(manager: &str, kind: &str) -> BTreeMap<String, String> {
    let mut selector = BTreeMap::new();
    selector.insert(LABEL_MANAGED_BY.to_string(), manager.to_string());
    selector.insert(LABEL_KIND.to_string(), kind.to_string());
    selector
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: Option<&String>) -> Option<DateTime<Utc>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|at| at.with_timezone(&Utc))
}

fn encode_extensions(data: &mut BTreeMap<String, String>, extensions: &HashMap<String, Value>) {
    for (key, value) in extensions {
        // Plain strings stay readable unless they would be mistaken for JSON.
        let encoded = match value {
            Value::String(s) if serde_json::from_str::<Value>(s).is_err() => s.clone(),
            other => other.to_string(),
        };
        data.insert(format!("{}{}", EXTENSION_PREFIX, key), encoded);
    }
}

fn decode_extensions(data: &BTreeMap<String, String>) -> HashMap<String, Value> {
    data.iter()
        .filter_map(|(key, raw)| {
            key.strip_prefix(EXTENSION_PREFIX).map(|name| {
                let value = serde_json::from_str::<Value>(raw)
                    .unwrap_or_else(|_| Value::String(raw.clone()));
                (name.to_string(), value)
            })
        })
        .collect()
}

pub fn deployment_to_record(
    deployment: &Deployment,
    tracking_namespace: &str,
    manager: &str,
    adapter: &str,
) -> Record {
    let mut labels = kind_selector(manager, KIND_DEPLOYMENT);
    labels.insert(LABEL_DEPLOYMENT_NAME.to_string(), deployment.name.clone());

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_ADAPTER.to_string(), adapter.to_string());

    let mut data = BTreeMap::new();
    data.insert("id".to_string(), deployment.id.clone());
    data.insert("name".to_string(), deployment.name.clone());
    data.insert("namespace".to_string(), deployment.namespace.clone());
    data.insert("packageId".to_string(), deployment.package_id.clone());
    data.insert("status".to_string(), deployment.status.to_string());
    data.insert("version".to_string(), deployment.version.to_string());
    data.insert("description".to_string(), deployment.description.clone());
    data.insert("createdAt".to_string(), format_time(&deployment.created_at));
    data.insert("updatedAt".to_string(), format_time(&deployment.updated_at));
    encode_extensions(&mut data, &deployment.extensions);

    Record {
        name: deployment_record_name(&deployment.name),
        namespace: tracking_namespace.to_string(),
        labels,
        annotations,
        data,
    }
}

/// Never fails: a corrupt or missing version reads as 1, corrupt timestamps read as the
/// epoch, and `updated_at` is clamped to be no earlier than `created_at`.
pub fn record_to_deployment(record: &Record) -> Deployment {
    let data = &record.data;
    let text = |key: &str| data.get(key).cloned().unwrap_or_default();

    let name = data
        .get("name")
        .cloned()
        .or_else(|| record.labels.get(LABEL_DEPLOYMENT_NAME).cloned())
        .or_else(|| record.name.strip_prefix(DEPLOYMENT_PREFIX).map(str::to_string))
        .unwrap_or_else(|| record.name.clone());
    let id = data.get("id").cloned().unwrap_or_else(|| name.clone());

    let version = data
        .get("version")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|version| *version >= 1)
        .unwrap_or(1);

    let created_at = parse_time(data.get("createdAt")).unwrap_or_default();
    let updated_at = parse_time(data.get("updatedAt"))
        .unwrap_or(created_at)
        .max(created_at);

    Deployment {
        id,
        name,
        namespace: text("namespace"),
        package_id: text("packageId"),
        status: data
            .get("status")
            .map_or(DeploymentStatus::Unknown, |raw| DeploymentStatus::from(raw.as_str())),
        version,
        description: text("description"),
        created_at,
        updated_at,
        extensions: decode_extensions(data),
    }
}

pub fn package_to_record(
    package: &DeploymentPackage,
    tracking_namespace: &str,
    manager: &str,
    adapter: &str,
) -> Record {
    let mut labels = kind_selector(manager, KIND_PACKAGE);
    labels.insert(LABEL_PACKAGE_NAME.to_string(), package.name.clone());

    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_ADAPTER.to_string(), adapter.to_string());

    let mut data = BTreeMap::new();
    data.insert("id".to_string(), package.id.clone());
    data.insert("name".to_string(), package.name.clone());
    data.insert("version".to_string(), package.version.clone());
    data.insert("packageType".to_string(), package.package_type.clone());
    data.insert("description".to_string(), package.description.clone());
    data.insert("uploadedAt".to_string(), format_time(&package.uploaded_at));
    encode_extensions(&mut data, &package.extensions);

    Record {
        name: package_record_name(&package.id),
        namespace: tracking_namespace.to_string(),
        labels,
        annotations,
        data,
    }
}

pub fn record_to_package(record: &Record) -> DeploymentPackage {
    let data = &record.data;
    let text = |key: &str| data.get(key).cloned().unwrap_or_default();

    DeploymentPackage {
        id: data
            .get("id")
            .cloned()
            .or_else(|| record.name.strip_prefix(PACKAGE_PREFIX).map(str::to_string))
            .unwrap_or_else(|| record.name.clone()),
        name: text("name"),
        version: text("version"),
        package_type: text("packageType"),
        description: text("description"),
        uploaded_at: parse_time(data.get("uploadedAt")).unwrap_or_default(),
        extensions: decode_extensions(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Deployment {
        let created = Utc::now();
        let mut extensions = HashMap::new();
        extensions.insert("overlayPath".to_string(), Value::from("overlays/edge"));
        extensions.insert("replicas".to_string(), Value::from(3));
        extensions.insert("site".to_string(), Value::from("42"));
        Deployment {
            id: "ran-du".to_string(),
            name: "ran-du".to_string(),
            namespace: "ran".to_string(),
            package_id: "pkg-7".to_string(),
            status: DeploymentStatus::Deploying,
            version: 4,
            description: "edge site".to_string(),
            created_at: created,
            updated_at: created + chrono::Duration::seconds(5),
            extensions,
        }
    }

    #[test]
    fn test_record_is_addressed_by_logical_name() {
        let record = deployment_to_record(&deployment(), "dms-system", "dms-gateway", "kustomize");
        assert_eq!(record.name, "dms-deployment-ran-du");
        assert_eq!(record.namespace, "dms-system");
        assert_eq!(record.kind(), Some(KIND_DEPLOYMENT));
        assert_eq!(record.data.get("version").map(String::as_str), Some("4"));
        assert_eq!(
            record.data.get("ext.overlayPath").map(String::as_str),
            Some("overlays/edge")
        );
    }

    #[test]
    fn test_decode_restores_fields() {
        let original = deployment();
        let record = deployment_to_record(&original, "dms-system", "dms-gateway", "kustomize");
        assert_eq!(record_to_deployment(&record), original);
    }

    #[test]
    fn test_corrupt_fields_fall_back() {
        let mut record = deployment_to_record(&deployment(), "dms-system", "dms-gateway", "k");
        record.data.insert("version".to_string(), "not-a-number".to_string());
        record.data.insert("status".to_string(), "Exploded".to_string());
        record.data.remove("createdAt");
        record.data.insert("updatedAt".to_string(), "yesterday".to_string());

        let decoded = record_to_deployment(&record);
        assert_eq!(decoded.version, 1);
        assert_eq!(decoded.status, DeploymentStatus::Unknown);
        assert_eq!(decoded.created_at, DateTime::<Utc>::default());
        assert!(decoded.updated_at >= decoded.created_at);

        record.data.remove("version");
        assert_eq!(record_to_deployment(&record).version, 1);
    }

    #[test]
    fn test_selector_matching() {
        let record = deployment_to_record(&deployment(), "dms-system", "dms-gateway", "k");
        assert!(record.matches(&kind_selector("dms-gateway", KIND_DEPLOYMENT)));
        assert!(!record.matches(&kind_selector("dms-gateway", KIND_PACKAGE)));
        assert!(!record.matches(&kind_selector("someone-else", KIND_DEPLOYMENT)));
    }
}
