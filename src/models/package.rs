use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPackage {
    /// Globally unique (UUID v4).
    pub id: String,
    pub name: String,
    pub version: String,
    pub package_type: String,
    #[serde(default)]
    pub description: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub extensions: HashMap<String, Value>,
}

impl DeploymentPackage {
    pub fn from_upload(upload: &PackageUpload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: upload.name.clone(),
            version: upload.version.clone(),
            package_type: upload.package_type.clone(),
            description: upload.description.clone(),
            uploaded_at: Utc::now(),
            extensions: upload.extensions.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageUpload {
    pub name: String,
    pub version: String,
    pub package_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extensions: HashMap<String, Value>,
    /// Raw package bytes; stored by a content store, never by the adapter.
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}
