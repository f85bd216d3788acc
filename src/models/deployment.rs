use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Common deployment status vocabulary every backend projects its native states onto.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Deploying,
    Deployed,
    Failed,
    RollingBack,
    Deleting,
    #[serde(other)]
    Unknown,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::RollingBack => "rolling-back",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse: anything unrecognized becomes `Unknown`.
impl FromStr for DeploymentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pending" => Self::Pending,
            "deploying" => Self::Deploying,
            "deployed" => Self::Deployed,
            "failed" => Self::Failed,
            "rolling-back" | "rollingback" => Self::RollingBack,
            "deleting" => Self::Deleting,
            _ => Self::Unknown,
        };
        Ok(status)
    }
}

impl From<&str> for DeploymentStatus {
    fn from(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub package_id: String,
    pub status: DeploymentStatus,
    /// Starts at 1 and grows by one on every successful update.
    pub version: u64,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extensions: HashMap<String, Value>,
}

impl Deployment {
    /// Apply a partial update, bumping the version and refreshing `updated_at`.
    ///
    /// `updated_at` is kept strictly later than its previous value even when the
    /// clock has not advanced.
    pub fn apply_update(&mut self, update: &DeploymentUpdate) {
        if let Some(package_id) = &update.package_id {
            self.package_id = package_id.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(extensions) = &update.extensions {
            for (key, value) in extensions {
                self.extensions.insert(key.clone(), value.clone());
            }
        }
        self.touch();
        self.version += 1;
    }

    pub fn touch(&mut self) {
        let now = Utc::now();
        let floor = self.updated_at + chrono::Duration::microseconds(1);
        self.updated_at = if now > self.updated_at { now } else { floor };
    }

    pub fn extension_str(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub package_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extensions: HashMap<String, Value>,
}

/// Partial update: `None` fields are left unchanged, extensions are merged key-wise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUpdate {
    pub package_id: Option<String>,
    pub description: Option<String>,
    pub extensions: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: bool,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Read-only projection of a deployment with progress and conditions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatusDetail {
    pub deployment_id: String,
    pub status: DeploymentStatus,
    pub message: String,
    /// 0..=100
    pub progress: u8,
    pub conditions: Vec<DeploymentCondition>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRevision {
    pub revision: u64,
    pub version: u64,
    pub package_id: String,
    pub status: DeploymentStatus,
    pub deployed_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentHistory {
    pub deployment_id: String,
    pub revisions: Vec<DeploymentRevision>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOptions {
    /// Only the last N lines when set.
    pub tail_lines: Option<usize>,
    /// Only lines written at or after this instant.
    pub since: Option<DateTime<Utc>>,
}
