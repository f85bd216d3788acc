use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::adapters::Capability;

/// Registry bookkeeping for one adapter. Values handed out by the registry are owned
/// copies; mutating them never affects the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub adapter_type: String,
    pub version: String,
    pub enabled: bool,
    pub default: bool,
    pub capabilities: Vec<Capability>,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub healthy: bool,
    pub health_error: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl PluginMetadata {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Published once per healthy/unhealthy flip observed by the health loop.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthTransition {
    pub name: String,
    pub healthy: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}
