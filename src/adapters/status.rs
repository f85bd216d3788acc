//! Projection of the common status vocabulary onto progress and conditions.

use crate::models::{Deployment, DeploymentCondition, DeploymentStatus, DeploymentStatusDetail};

pub const CONDITION_READY: &str = "Ready";

pub fn status_progress(status: DeploymentStatus) -> u8 {
    match status {
        DeploymentStatus::Pending => 25,
        DeploymentStatus::Deploying => 50,
        DeploymentStatus::Deployed => 100,
        DeploymentStatus::RollingBack => 30,
        DeploymentStatus::Deleting => 10,
        DeploymentStatus::Failed | DeploymentStatus::Unknown => 0,
    }
}

/// Returns `(healthy, reason)` for the ready condition.
pub fn status_condition(status: DeploymentStatus) -> (bool, &'static str) {
    match status {
        DeploymentStatus::Pending => (false, "Pending"),
        DeploymentStatus::Deploying => (false, "Progressing"),
        DeploymentStatus::Deployed => (true, "Succeeded"),
        DeploymentStatus::RollingBack => (false, "RollingBack"),
        DeploymentStatus::Deleting => (false, "Deleting"),
        DeploymentStatus::Failed => (false, "Failed"),
        DeploymentStatus::Unknown => (false, "Unknown"),
    }
}

pub fn build_status_detail(deployment: &Deployment) -> DeploymentStatusDetail {
    let (healthy, reason) = status_condition(deployment.status);
    let message = format!(
        "deployment {} is {} (version {})",
        deployment.name, deployment.status, deployment.version
    );

    DeploymentStatusDetail {
        deployment_id: deployment.id.clone(),
        status: deployment.status,
        message: message.clone(),
        progress: status_progress(deployment.status),
        conditions: vec![DeploymentCondition {
            condition_type: CONDITION_READY.to_string(),
            status: healthy,
            reason: reason.to_string(),
            message,
            last_transition_time: deployment.updated_at,
        }],
        updated_at: deployment.updated_at,
    }
}
